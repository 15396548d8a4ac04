extern crate of_unflatten;

mod common;

use common::{sample_blob, FdtWriter, TestAlloc};
use of_unflatten::error::DevTreeError;
use of_unflatten::machine::Machine;
use of_unflatten::unflatten::{OfDeviceId, UnflattenState};

#[test]
fn setup_and_teardown() {
    let blob = sample_blob(false);
    let alloc = TestAlloc::new();
    let mut machine = Machine::new(&alloc);
    assert_eq!(machine.state(), UnflattenState::Uninitialized);

    machine.setup_from_slice(blob.bytes()).unwrap();
    assert_eq!(machine.state(), UnflattenState::Ready);
    assert_eq!(alloc.live(), 1);

    let cpu = machine.find_by_path("/cpus/cpu@0").unwrap();
    assert_eq!(machine.find_by_phandle(None, 1), Some(cpu));
    assert_eq!(machine.find_by_name(None, "chosen").unwrap().full_name().unwrap(), "/chosen");
    assert_eq!(machine.root().unwrap().children().count(), 2);
    assert_eq!(machine.tree().unwrap().node_count(), 4);

    machine.teardown();
    assert_eq!(machine.state(), UnflattenState::Uninitialized);
    assert!(machine.tree().is_none());
    assert_eq!(alloc.live(), 0);
}

#[test]
fn setup_replaces_previous_tree() {
    let first = sample_blob(false);
    let mut w = FdtWriter::new();
    w.begin_node("").begin_node("soc").end_node().end_node();
    let second = w.finish();

    let alloc = TestAlloc::new();
    let mut machine = Machine::new(&alloc);
    machine.setup_from_slice(first.bytes()).unwrap();
    machine.setup_from_slice(second.bytes()).unwrap();

    assert_eq!(alloc.live(), 1);
    assert!(machine.find_by_path("/cpus").is_none());
    assert!(machine.find_by_path("/soc").is_some());
}

#[test]
fn raw_pointer_setup() {
    let blob = sample_blob(false);
    let alloc = TestAlloc::new();
    let mut machine = Machine::new(&alloc);

    unsafe { machine.setup(blob.bytes().as_ptr()) }.unwrap();
    assert_eq!(machine.state(), UnflattenState::Ready);
    assert!(machine.find_compatible(None, None, "vendor,cpu").is_some());

    let err = unsafe { machine.setup(core::ptr::null()) }.unwrap_err();
    assert!(err.is_invalid_blob());
    assert_eq!(machine.state(), UnflattenState::Failed);
    assert!(machine.tree().is_none());
    assert_eq!(alloc.live(), 0);
}

#[test]
fn bad_magic_leaves_nothing_to_find() {
    let mut blob = sample_blob(false);
    blob.bytes_mut()[3] ^= 0xff;

    let alloc = TestAlloc::new();
    let mut machine = Machine::new(&alloc);
    assert_eq!(
        machine.setup_from_slice(blob.bytes()).unwrap_err(),
        DevTreeError::InvalidMagicNumber
    );
    assert_eq!(machine.state(), UnflattenState::Failed);
    assert_eq!(alloc.allocs(), 0);

    let table = [OfDeviceId::new("vendor,cpu", ())];
    assert!(machine.root().is_none());
    assert!(machine.find_by_path("/cpus/cpu@0").is_none());
    assert!(machine.find_by_name(None, "cpu").is_none());
    assert!(machine.find_by_type(None, "cpu").is_none());
    assert!(machine.find_by_phandle(None, 1).is_none());
    assert!(machine.find_compatible(None, None, "vendor,cpu").is_none());
    assert!(machine.find_matching_node(None, &table).is_none());
}

#[test]
fn truncated_blobs_are_not_device_trees() {
    let blob = sample_blob(false);
    let alloc = TestAlloc::new();
    let mut machine = Machine::new(&alloc);

    for len in [0, 2].iter() {
        let err = machine.setup_from_slice(&blob.bytes()[..*len]).unwrap_err();
        assert_eq!(err, DevTreeError::InvalidMagicNumber);
        assert!(err.is_invalid_blob());
        assert_eq!(machine.state(), UnflattenState::Failed);
    }

    // The magic alone is not a header.
    assert_eq!(
        machine.setup_from_slice(&blob.bytes()[..8]).unwrap_err(),
        DevTreeError::ParseError
    );
    assert_eq!(alloc.allocs(), 0);
}

#[test]
fn failed_setup_is_observable() {
    let blob = sample_blob(false);
    let alloc = TestAlloc::failing_after(4);
    let mut machine = Machine::new(&alloc);

    assert_eq!(
        machine.setup_from_slice(blob.bytes()).unwrap_err(),
        DevTreeError::AllocationFailure
    );
    assert_eq!(machine.state(), UnflattenState::Failed);
    assert!(machine.tree().is_none());
    assert_eq!(alloc.live(), 0);

    let empty = FdtWriter::new().finish();
    let alloc = TestAlloc::new();
    let mut machine = Machine::new(&alloc);
    assert_eq!(
        machine.setup_from_slice(empty.bytes()).unwrap_err(),
        DevTreeError::EmptyTree
    );
    assert_eq!(machine.state(), UnflattenState::Failed);
}
