//! Tests for the binding registry and duplicate culling
//!
//! # Test Coverage
//!
//! Validates the registry's responsibilities:
//! - The first registered loop becomes the bound instance
//! - Re-registering the bound loop is a no-op
//! - `SelfOnly` retires a duplicate newcomer
//! - `All` retires every other instance and rebinds the newcomer
//! - `Disabled` keeps duplicates as spares and promotes them on release
//! - A quit signal freezes the registry: no binding, no promotion
//!
//! # Test Strategy
//!
//! Each test constructs its loops on the test thread so retired instances
//! can be ticked directly to observe the failure.


use mainspring::{Binding, CullingMode, DispatchError, InitOutcome, LifecycleState, MainLoop};
use tracing_util::TestTracing;

#[test]
fn first_loop_binds_and_rebinding_is_idempotent() {
    let _tracing = TestTracing::init();
    let binding = Binding::new();
    let main_loop = MainLoop::new();

    assert_eq!(
        binding.initialize(&main_loop, CullingMode::SelfOnly).unwrap(),
        InitOutcome::Bound
    );
    assert_eq!(
        binding.initialize(&main_loop, CullingMode::SelfOnly).unwrap(),
        InitOutcome::Bound
    );
    assert_eq!(binding.current().unwrap().id(), main_loop.id());
}

#[test]
fn self_culling_retires_the_newcomer() {
    let _tracing = TestTracing::init();
    let binding = Binding::new();
    let first = MainLoop::new();
    let mut second = MainLoop::new();

    binding.initialize(&first, CullingMode::SelfOnly).unwrap();
    assert_eq!(
        binding.initialize(&second, CullingMode::SelfOnly).unwrap(),
        InitOutcome::CulledSelf
    );

    assert_eq!(second.state(), LifecycleState::Destroyed);
    assert!(matches!(
        second.update(),
        Err(DispatchError::ShuttingDown)
    ));
    assert_eq!(binding.current().unwrap().id(), first.id());
}

#[test]
fn all_culling_leaves_only_the_bound_instance() {
    let _tracing = TestTracing::init();
    let binding = Binding::new();
    let mut first = MainLoop::new();
    let mut spare = MainLoop::new();
    let mut last = MainLoop::new();

    binding.initialize(&first, CullingMode::Disabled).unwrap();
    assert_eq!(
        binding.initialize(&spare, CullingMode::Disabled).unwrap(),
        InitOutcome::KeptDuplicate
    );
    // Three instances exist; the `All` pass retires every unbound one,
    // the newly initializing loop included.
    assert_eq!(
        binding.initialize(&last, CullingMode::All).unwrap(),
        InitOutcome::CulledDuplicates(2)
    );

    assert_eq!(binding.current().unwrap().id(), first.id());
    assert!(first.update().is_ok());
    assert!(matches!(spare.update(), Err(DispatchError::ShuttingDown)));
    assert!(matches!(last.update(), Err(DispatchError::ShuttingDown)));
}

#[test]
fn disabled_culling_promotes_a_spare_on_release() {
    let _tracing = TestTracing::init();
    let binding = Binding::new();
    let first = MainLoop::new();
    let spare = MainLoop::new();
    let spare_id = spare.id();

    binding.initialize(&first, CullingMode::Disabled).unwrap();
    binding.initialize(&spare, CullingMode::Disabled).unwrap();

    let first_id = first.id();
    first.destroy();
    binding.release(first_id);

    let promoted = binding.current().unwrap();
    assert_eq!(promoted.id(), spare_id);
    assert!(promoted.submit(|| {}).is_ok());
}

#[test]
fn destroyed_loops_are_pruned_without_release() {
    let _tracing = TestTracing::init();
    let binding = Binding::new();
    let first = MainLoop::new();
    let spare = MainLoop::new();
    let spare_id = spare.id();

    binding.initialize(&first, CullingMode::Disabled).unwrap();
    binding.initialize(&spare, CullingMode::Disabled).unwrap();

    // The bound loop dies without telling the registry; the next lookup
    // notices and promotes.
    first.destroy();
    assert_eq!(binding.current().unwrap().id(), spare_id);
}

#[test]
fn paired_quit_prevents_spare_promotion() {
    let _tracing = TestTracing::init();
    let binding = Binding::new();
    let mut first = MainLoop::new();
    let spare = MainLoop::new();

    binding.initialize(&first, CullingMode::Disabled).unwrap();
    binding.initialize(&spare, CullingMode::Disabled).unwrap();

    // Shutdown touches both surfaces: the loop and the registry.
    first.notify_quit().unwrap();
    binding.notify_quit();
    first.destroy();

    // The spare survives as an object but must not be promoted.
    assert!(binding.current().is_none());
    assert_eq!(spare.state(), LifecycleState::Active);
}

#[test]
fn quit_freezes_the_registry() {
    let _tracing = TestTracing::init();
    let binding = Binding::new();
    let first = MainLoop::new();
    let late = MainLoop::new();

    binding.initialize(&first, CullingMode::SelfOnly).unwrap();
    binding.notify_quit();

    assert!(binding.current().is_none());
    assert!(matches!(
        binding.initialize(&late, CullingMode::SelfOnly),
        Err(DispatchError::ShuttingDown)
    ));
}
