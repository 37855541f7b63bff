//! End-to-end loading and writing through a mock backend

mod common;

use common::{MockBackend, MockFile};
use filecube::config::{CoordScanSpec, FilegroupSpec};
use filecube::dimension::Dimension;
use filecube::errors::{FilecubeError, Result};
use filecube::keyring::Key;
use filecube::session::Session;
use ndarray::{ArrayD, IxDyn};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// Data of a file holding two time steps from `first_time`, stored as
/// (band, latitude, time). Band 1 is filled with -1.
fn block(first_time: usize) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(&[2, 3, 2]), |idx| {
        if idx[0] == 1 {
            -1.0
        } else {
            ((first_time + idx[2]) * 10 + idx[1]) as f32
        }
    })
}

fn sst_file(first_time: usize) -> MockFile {
    let times = vec![first_time as f64, (first_time + 1) as f64];
    MockFile::new()
        .coord("time", times)
        .coord("latitude", vec![10.0, 20.0, 30.0])
        .variable("analysed_sst", &["band", "latitude", "time"], block(first_time))
}

/// Files T_0.nc (times 0, 1) and T_1.nc (times 2, 3)
fn sst_session(dir: &Path, backend: &Arc<MockBackend>) -> Result<Session> {
    backend.add_file(dir, "T_0.nc", sst_file(0));
    backend.add_file(dir, "T_1.nc", sst_file(2));

    let dims = vec![Dimension::new("time"), Dimension::new("lat")];
    let mut session = Session::new(dims, backend.clone());
    session.add_filegroup(
        FilegroupSpec::new("sst", dir, r"T_%(time:int)\.nc")
            .coord(CoordScanSpec::hybrid("time").scan_in_file())
            .coord(CoordScanSpec::in_file("lat").infile_name("latitude").scan_in_file())
            .variable_as("SST", "analysed_sst"),
    )?;
    session.scan()?;
    Ok(session)
}

#[test]
fn test_load_full_selection() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = Arc::new(MockBackend::new());
    let session = sst_session(dir.path(), &backend)?;

    let selection = session.select(Vec::<(&str, Key)>::new())?;
    let data = session.load("SST", &selection)?;

    // Axes follow the selection (time, lat), not the file (band, latitude, time)
    assert_eq!(data.shape(), &[4, 3]);
    for t in 0..4 {
        for l in 0..3 {
            assert_eq!(data[[t, l]], (t * 10 + l) as f32, "time {t}, lat {l}");
        }
    }
    assert_eq!(backend.opened(), backend.closed());
    Ok(())
}

#[test]
fn test_load_partial_selection() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = Arc::new(MockBackend::new());
    let session = sst_session(dir.path(), &backend)?;

    let selection = session.select([("time", Key::Int(3)), ("lat", Key::List(vec![2, 0]))])?;
    let data = session.load("SST", &selection)?;
    assert_eq!(data.shape(), &[1, 2]);
    assert_eq!(data[[0, 0]], 32.0);
    assert_eq!(data[[0, 1]], 30.0);

    let selection = session.select([("time", Key::range(1, 3)), ("lat", Key::Int(1))])?;
    let data = session.load("SST", &selection)?;
    assert_eq!(data.shape(), &[2, 1]);
    assert_eq!(data[[0, 0]], 11.0);
    assert_eq!(data[[1, 0]], 21.0);
    Ok(())
}

#[test]
fn test_load_leaves_missing_positions_empty() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = Arc::new(MockBackend::new());
    backend.add_file(dir.path(), "T_0.nc", sst_file(0));
    // A second filegroup extends the time axis but has no SST
    backend.add_file(
        dir.path(),
        "U_2.nc",
        MockFile::new()
            .coord("time", vec![2.0, 3.0])
            .coord("latitude", vec![10.0, 20.0, 30.0]),
    );

    let dims = vec![Dimension::new("time"), Dimension::new("lat")];
    let mut session = Session::new(dims, backend.clone());
    session.add_filegroup(
        FilegroupSpec::new("sst", dir.path(), r"T_%(time:int)\.nc")
            .coord(CoordScanSpec::hybrid("time").scan_in_file())
            .coord(CoordScanSpec::in_file("lat").infile_name("latitude").scan_in_file())
            .variable_as("SST", "analysed_sst"),
    )?;
    session.add_filegroup(
        FilegroupSpec::new("other", dir.path(), r"U_%(time:int)\.nc")
            .coord(CoordScanSpec::hybrid("time").scan_in_file())
            .coord(CoordScanSpec::in_file("lat").infile_name("latitude").scan_in_file()),
    )?;
    session.scan()?;
    assert_eq!(session.dim("time").map(Dimension::size), Some(4));

    let selection = session.select([("time", Key::range(1, 4))])?;
    let data = session.load("SST", &selection)?;
    assert_eq!(data.shape(), &[3, 3]);
    assert_eq!(data[[0, 2]], 12.0);
    assert!(data[[1, 0]].is_nan());
    assert!(data[[2, 2]].is_nan());

    // Unknown variables give an empty array at session level, an error at filegroup level
    let data = session.load("SSH", &selection)?;
    assert!(data.iter().all(|v| v.is_nan()));
    let fg = session.filegroup("sst").expect("filegroup exists");
    let pair = fg.get_fg_keyrings(&selection)?.expect("sst holds time 1");
    let mut dest = session.allocate(&selection);
    let result = fg.load(session.backend(), "SSH", &pair.infile, &pair.memory, &mut dest);
    assert!(matches!(result, Err(FilecubeError::Config(_))));
    Ok(())
}

#[test]
fn test_write_selection() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let backend = Arc::new(MockBackend::new());
    let session = sst_session(dir.path(), &backend)?;

    // Times 1 and 2 live in different files
    let selection = session.select([("time", Key::range(1, 3))])?;
    let values = ArrayD::from_shape_fn(IxDyn(&[2, 3]), |idx| -((idx[0] * 3 + idx[1]) as f32) - 100.0);
    session.write("SST", &selection, values.view())?;

    let first = backend.data(&dir.path().join("T_0.nc"), "analysed_sst");
    assert_eq!(first[[0, 0, 0]], 0.0);
    assert_eq!(first[[0, 0, 1]], -100.0);
    assert_eq!(first[[0, 2, 1]], -102.0);
    // Band 1 is not touched
    assert_eq!(first[[1, 2, 1]], -1.0);

    let second = backend.data(&dir.path().join("T_1.nc"), "analysed_sst");
    assert_eq!(second[[0, 1, 0]], -104.0);
    assert_eq!(second[[0, 1, 1]], 31.0);

    // Reading back gives what was written
    let data = session.load("SST", &selection)?;
    assert_eq!(data, values);

    let wrong = ArrayD::<f32>::zeros(IxDyn(&[3, 3]));
    assert!(matches!(
        session.write("SST", &selection, wrong.view()),
        Err(FilecubeError::ShapeMismatch(_))
    ));
    assert_eq!(backend.opened(), backend.closed());
    Ok(())
}
