//! On-disk round trips, HDF5 image checks and selection properties for the
//! container backend.

use proptest::prelude::*;
use rustyescdf_store::{
    Dataspace, Datatype, Elements, File, FileAccessProps, Selection, StoreError,
};

// ---------------------------------------------------------------------------
// 1. Persistence
// ---------------------------------------------------------------------------

#[test]
fn create_flush_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("container.h5");

    let mut f = File::create(&path, FileAccessProps::new()).unwrap();
    let root = f.root();
    let g = f.create_group(root, "densities").unwrap();
    let ds = f
        .create_dataset(g, "rho", Datatype::Float64, Dataspace::simple(&[2, 2]))
        .unwrap();
    f.write_dataset(ds, &Selection::All, &Elements::Float64(vec![0.1, 0.2, 0.3, 0.4]))
        .unwrap();
    f.create_attr(ds, "label", Datatype::FixedString { size: 8 }, Dataspace::scalar())
        .unwrap();
    f.write_attr(
        ds,
        "label",
        &Elements::Chars {
            width: 5,
            data: b"pseud".to_vec(),
        },
    )
    .unwrap();
    f.flush().unwrap();
    drop(f);

    let f = File::open(&path, FileAccessProps::new().read_only()).unwrap();
    let ds = f.open_dataset(f.root(), "densities/rho").unwrap();
    let info = f.dataset_info(ds).unwrap();
    assert_eq!(info.datatype, Datatype::Float64);
    assert_eq!(info.dataspace.dimensions, vec![2, 2]);
    assert_eq!(
        f.read_dataset(ds, &Selection::Points(vec![vec![1, 1]]), Datatype::Float64)
            .unwrap(),
        Elements::Float64(vec![0.4])
    );
    assert_eq!(
        f.read_attr(ds, "label", Datatype::FixedString { size: 8 }).unwrap(),
        Elements::Chars {
            width: 8,
            data: b"pseud\0\0\0".to_vec()
        }
    );
    assert_eq!(f.dataset_names(f.root()).unwrap(), Vec::<String>::new());
    assert_eq!(f.group_names(f.root()).unwrap(), vec!["densities"]);
}

#[test]
fn flush_is_atomic_rename() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("c.h5");
    let mut f = File::create(&path, FileAccessProps::new()).unwrap();
    f.create_group(f.root(), "g").unwrap();
    f.flush().unwrap();
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn open_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = File::open(dir.path().join("absent.h5"), FileAccessProps::new()).unwrap_err();
    assert!(matches!(err, StoreError::Io(_)));
}

#[test]
fn create_read_only_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = File::create(dir.path().join("x"), FileAccessProps::new().read_only()).unwrap_err();
    assert!(matches!(err, StoreError::ReadOnly));
}

// ---------------------------------------------------------------------------
// 2. HDF5 file images
// ---------------------------------------------------------------------------

fn sample() -> File {
    let mut f = File::in_memory();
    let root = f.root();
    let g = f.create_group(root, "geometries").unwrap();
    f.create_attr(g, "count", Datatype::UInt32, Dataspace::scalar()).unwrap();
    f.write_attr(g, "count", &Elements::UInt32(vec![2])).unwrap();
    let ds = f
        .create_dataset(g, "positions", Datatype::Float64, Dataspace::simple(&[2, 2]))
        .unwrap();
    f.write_dataset(ds, &Selection::All, &Elements::Float64(vec![0.0, 0.5, 1.0, 1.5]))
        .unwrap();
    f.create_dataset(g, "empty", Datatype::Int64, Dataspace::simple(&[0]))
        .unwrap();
    f.create_soft_link(root, "latest", "/geometries").unwrap();
    f
}

#[test]
fn image_is_hdf5() {
    let bytes = sample().to_bytes().unwrap();
    assert_eq!(&bytes[..8], b"\x89HDF\r\n\x1a\n");
    assert_eq!(bytes[8], 2, "superblock version");
    assert_eq!(&bytes[48..52], b"OHDR", "root object header follows the superblock");
}

#[test]
fn decoded_tree_matches() {
    let f = sample();
    let back = File::from_bytes(&f.to_bytes().unwrap(), FileAccessProps::new()).unwrap();
    let g = back.open_group(back.root(), "latest").unwrap();
    assert_eq!(
        back.read_attr(g, "count", Datatype::UInt32).unwrap(),
        Elements::UInt32(vec![2])
    );
    let ds = back.open_dataset(g, "positions").unwrap();
    assert_eq!(
        back.read_dataset(ds, &Selection::All, Datatype::Float64).unwrap(),
        Elements::Float64(vec![0.0, 0.5, 1.0, 1.5])
    );
    let empty = back.open_dataset(g, "empty").unwrap();
    assert_eq!(back.dataset_info(empty).unwrap().dataspace, Dataspace::simple(&[0]));
    assert!(back
        .read_dataset(empty, &Selection::All, Datatype::Int64)
        .unwrap()
        .is_empty());
    assert_eq!(back.dataset_names(g).unwrap(), vec!["empty", "positions"]);
}

#[test]
fn re_encoding_is_stable() {
    let first = sample().to_bytes().unwrap();
    let back = File::from_bytes(&first, FileAccessProps::new()).unwrap();
    assert_eq!(back.to_bytes().unwrap(), first);
}

#[test]
fn corrupted_header_fails_checksum() {
    let mut bytes = sample().to_bytes().unwrap();
    bytes[60] ^= 0xff;
    let err = File::from_bytes(&bytes, FileAccessProps::new()).unwrap_err();
    assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
}

#[test]
fn not_an_hdf5_file() {
    let err = File::from_bytes(b"not a container at all", FileAccessProps::new()).unwrap_err();
    assert!(matches!(err, StoreError::BadMagic));
}

#[test]
fn truncated_image_without_checksum() {
    let bytes = sample().to_bytes().unwrap();
    let cut = &bytes[..bytes.len() - 20];
    let err = File::from_bytes(cut, FileAccessProps::new().skip_checksum()).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Truncated(_) | StoreError::Corrupt(_)
    ));
}

// ---------------------------------------------------------------------------
// 3. Selections against stored data
// ---------------------------------------------------------------------------

#[test]
fn strided_read_of_row() {
    let mut f = File::in_memory();
    let ds = f
        .create_dataset(f.root(), "v", Datatype::Int32, Dataspace::simple(&[10]))
        .unwrap();
    f.write_dataset(ds, &Selection::All, &Elements::Int32((0..10).collect()))
        .unwrap();
    let sel = Selection::strided(&[1], &[4], Some(&[2]));
    assert_eq!(
        f.read_dataset(ds, &sel, Datatype::Int64).unwrap(),
        Elements::Int64(vec![1, 3, 5, 7])
    );
}

#[test]
fn out_of_bounds_selection_rejected() {
    let mut f = File::in_memory();
    let ds = f
        .create_dataset(f.root(), "v", Datatype::Int32, Dataspace::simple(&[3]))
        .unwrap();
    let err = f
        .read_dataset(ds, &Selection::slice(&[2..4]), Datatype::Int32)
        .unwrap_err();
    assert!(matches!(err, StoreError::SelectionOutOfBounds { .. }));
}

proptest! {
    #[test]
    fn hyperslab_offsets_stay_in_bounds(
        dim in 1u64..40,
        start in 0u64..40,
        count in 0u64..10,
        stride in 1u64..5,
    ) {
        let sel = Selection::strided(&[start], &[count], Some(&[stride]));
        if sel.validate(&[dim]).is_ok() {
            let offsets = sel.offsets(&[dim]);
            prop_assert_eq!(offsets.len() as u64, sel.num_elements(&[dim]));
            prop_assert!(offsets.iter().all(|&o| (o as u64) < dim));
        }
    }

    #[test]
    fn scattered_write_then_read_matches(values in proptest::collection::vec(-1000i32..1000, 1..20)) {
        let n = values.len() as u64;
        let mut f = File::in_memory();
        let ds = f
            .create_dataset(f.root(), "v", Datatype::Int32, Dataspace::simple(&[n]))
            .unwrap();
        let reversed: Vec<Vec<u64>> = (0..n).rev().map(|i| vec![i]).collect();
        let sel = Selection::Points(reversed);
        f.write_dataset(ds, &sel, &Elements::Int32(values.clone())).unwrap();
        prop_assert_eq!(
            f.read_dataset(ds, &sel, Datatype::Int32).unwrap(),
            Elements::Int32(values)
        );
    }
}
