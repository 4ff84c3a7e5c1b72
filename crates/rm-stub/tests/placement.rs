use rm_lowmem::{AddressTranslator, PcLowMemory, PcLowMemoryConfig, PhysAddr};
use rm_stub::entry::{initialise_via_librm, RealModeRegs};
use rm_stub::hooks::{register_librm, BootContext, Lifecycle, Phase};
use rm_stub::{
    LibrmConfig, StackGeometry, StubImage, StubManager, FALLBACK_BASE, FALLBACK_STACK_SEGMENT,
    FALLBACK_STACK_SIZE, STUB_HEADER_LEN,
};

/// Where the first 1KiB allocation lands with 640KiB of base memory.
const OWNED_BASE: PhysAddr = PhysAddr::new(639 * 1024);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn new_ctx() -> BootContext<PcLowMemory> {
    BootContext::new(
        PcLowMemory::new(PcLowMemoryConfig::default()).unwrap(),
        StubManager::new(StubImage::builtin(), LibrmConfig::default()),
    )
}

fn phys_bytes(mem: &PcLowMemory, addr: PhysAddr, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    mem.read_phys(addr, &mut buf);
    buf
}

#[test]
fn bootstrap_twice_changes_nothing() {
    let mut ctx = new_ctx();

    ctx.librm.ensure_bootstrapped(&mut ctx.platform);
    let installed = ctx.librm.installed();
    let stack = ctx.librm.stack_geometry(&ctx.platform).unwrap();

    ctx.librm
        .push_to_rm_stack(&mut ctx.platform, &[0xAA; 6])
        .unwrap();
    let pushed = ctx.librm.stack_geometry(&ctx.platform).unwrap();

    ctx.librm.ensure_bootstrapped(&mut ctx.platform);
    assert_eq!(ctx.librm.installed(), installed);
    assert_eq!(ctx.librm.stack_geometry(&ctx.platform).unwrap(), pushed);
    assert_eq!(pushed.offset, stack.offset - 6);
}

#[test]
fn fallback_contract_holds_under_any_mapping() {
    for virt_offset in [0, 0x1000, 0x0010_0000, 0xFFF0_0000] {
        let mut mem = PcLowMemory::new(PcLowMemoryConfig {
            virt_offset,
            ..Default::default()
        })
        .unwrap();
        let mut librm = StubManager::new(StubImage::builtin(), LibrmConfig::default());

        for _ in 0..3 {
            librm.ensure_bootstrapped(&mut mem);
        }

        assert_eq!(librm.base(), Some(FALLBACK_BASE));
        assert_eq!(librm.installed(), Some(mem.phys_to_linear(FALLBACK_BASE)));
        assert_eq!(
            librm.stack_geometry(&mem).unwrap(),
            StackGeometry::empty(FALLBACK_STACK_SEGMENT, FALLBACK_STACK_SIZE)
        );
        assert_eq!(
            phys_bytes(&mem, FALLBACK_BASE.offset(STUB_HEADER_LEN as u32).unwrap(), 1),
            [0xCB]
        );
        assert_eq!(mem.allocations(), 0);
    }
}

#[test]
fn migration_allocates_exactly_once() {
    init_tracing();
    let mut ctx = new_ctx();
    ctx.librm.ensure_bootstrapped(&mut ctx.platform);

    ctx.librm.migrate_to_owned_storage(&mut ctx.platform).unwrap();
    assert!(ctx.librm.is_allocated());
    assert_eq!(ctx.librm.base(), Some(OWNED_BASE));

    ctx.librm.migrate_to_owned_storage(&mut ctx.platform).unwrap();
    assert_eq!(ctx.librm.base(), Some(OWNED_BASE));
    assert_eq!(ctx.platform.allocations(), 1);
    assert_eq!(ctx.platform.frees(), 0);
    assert_eq!(ctx.platform.live_blocks(), 1);
    assert_eq!(ctx.platform.free_base_memory_kib(), 639);
}

#[test]
fn migration_after_relocation_carries_stack_state() {
    init_tracing();
    let mut ctx = new_ctx();
    ctx.librm.ensure_bootstrapped(&mut ctx.platform);
    ctx.librm
        .push_to_rm_stack(&mut ctx.platform, b"args")
        .unwrap();

    ctx.platform.relocate_to(0x0010_0000);
    ctx.librm.migrate_to_owned_storage(&mut ctx.platform).unwrap();

    assert_eq!(
        ctx.librm.installed(),
        Some(ctx.platform.phys_to_linear(OWNED_BASE))
    );
    let stack = ctx.librm.stack_geometry(&ctx.platform).unwrap();
    assert_eq!(stack.segment, FALLBACK_STACK_SEGMENT);
    assert_eq!(stack.offset, FALLBACK_STACK_SIZE - 4);

    // The master image picked up the same bookkeeping during the flush.
    assert_eq!(ctx.librm.image().stack_geometry(), stack);

    // The old copy is left in place, not cleared: right after the move it matches the new one.
    let len = ctx.librm.image().len();
    assert_eq!(
        phys_bytes(&ctx.platform, FALLBACK_BASE, len),
        phys_bytes(&ctx.platform, OWNED_BASE, len)
    );
    assert_eq!(
        phys_bytes(&ctx.platform, OWNED_BASE, len),
        ctx.librm.image().as_bytes()
    );

    let mut out = [0u8; 4];
    ctx.librm
        .pop_from_rm_stack(&mut ctx.platform, Some(&mut out), 4)
        .unwrap();
    assert_eq!(&out, b"args");
}

#[test]
fn teardown_frees_owned_copy_and_leaves_it_intact() {
    let mut ctx = new_ctx();
    let mut lifecycle = Lifecycle::new();
    register_librm(&mut lifecycle).unwrap();

    ctx.platform.schedule_relocation(0x2_0000);
    lifecycle.boot(&mut ctx).unwrap();
    assert_eq!(lifecycle.phase(), Phase::Relocated);
    assert_eq!(ctx.librm.base(), Some(OWNED_BASE));

    ctx.librm
        .push_to_rm_stack(&mut ctx.platform, &[1, 2])
        .unwrap();
    let installed = phys_bytes(&ctx.platform, OWNED_BASE, ctx.librm.image().len());

    lifecycle.shutdown(&mut ctx).unwrap();

    assert!(!ctx.librm.is_allocated());
    assert_eq!(ctx.platform.frees(), 1);
    assert_eq!(ctx.platform.live_blocks(), 0);
    assert_eq!(ctx.platform.free_base_memory_kib(), 640);
    assert_eq!(ctx.librm.image().as_bytes(), installed.as_slice());
    assert_eq!(
        phys_bytes(&ctx.platform, OWNED_BASE, ctx.librm.image().len()),
        installed
    );
    assert_eq!(
        ctx.librm.image().stack_geometry().offset,
        FALLBACK_STACK_SIZE - 2
    );
}

#[test]
fn second_relocation_event_only_re_derives_location() {
    let mut ctx = new_ctx();
    let mut lifecycle = Lifecycle::new();
    register_librm(&mut lifecycle).unwrap();
    lifecycle.boot(&mut ctx).unwrap();

    ctx.platform.relocate_to(0x0040_0000);
    lifecycle.post_relocate(&mut ctx).unwrap();

    assert_eq!(ctx.platform.allocations(), 1);
    assert_eq!(ctx.librm.base(), Some(OWNED_BASE));
    assert_eq!(
        ctx.librm.installed(),
        Some(ctx.platform.phys_to_linear(OWNED_BASE))
    );
}

#[test]
fn entry_through_prefix_publishes_new_segment() {
    let mut ctx = new_ctx();
    let mut lifecycle = Lifecycle::new();
    register_librm(&mut lifecycle).unwrap();
    ctx.platform.schedule_relocation(0x0800_0000);

    let mut regs = RealModeRegs::default();
    regs.set_di(0x0008);
    initialise_via_librm(&mut regs, &mut lifecycle, &mut ctx).unwrap();

    assert_eq!(regs.es, (OWNED_BASE.value() >> 4) as u16);
    assert_eq!(regs.di(), 0x0008);
    assert_eq!(regs.es_di(), OWNED_BASE.value() + 8);
}

#[test]
fn entry_via_existing_copy_skips_fallback() {
    let mut ctx = new_ctx();
    let entered_at = PhysAddr::new(0x8_0000);
    ctx.platform
        .write_phys(entered_at, StubImage::builtin().as_bytes());
    ctx.librm.adopt_entry_base(&ctx.platform, entered_at);

    let mut lifecycle = Lifecycle::new();
    register_librm(&mut lifecycle).unwrap();
    lifecycle.boot(&mut ctx).unwrap();

    // Nothing was written at the fallback address.
    assert_eq!(
        phys_bytes(&ctx.platform, FALLBACK_BASE, 16),
        vec![0u8; 16]
    );
    assert_eq!(ctx.librm.base(), Some(OWNED_BASE));
}
