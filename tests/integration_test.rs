//! Scanning, loading and writing real NetCDF files

#![cfg(feature = "netcdf")]

use filecube::config::{CoordScanSpec, FilegroupSpec, ScanConfig};
use filecube::dimension::Dimension;
use filecube::keyring::Key;
use filecube::netcdf_io::NetcdfBackend;
use filecube::session::Session;
use netcdf::create;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// Write a file with two time steps from `first_time`, SST stored as (lat, time)
fn write_file(path: &Path, first_time: usize) {
    let times = [first_time as f64, (first_time + 1) as f64];
    let lats = [-10.0_f64, 0.0, 10.0];
    let sst: Vec<f32> = (0..3)
        .flat_map(|l| (0..2).map(move |t| ((first_time + t) * 10 + l) as f32))
        .collect();

    let mut file = create(path).expect("Failed to create NetCDF file");
    file.add_dimension("time", 2)
        .expect("Failed to add dimension time");
    file.add_dimension("lat", 3)
        .expect("Failed to add dimension lat");

    let mut var = file
        .add_variable::<f64>("time", &["time"])
        .expect("Failed to add variable time");
    var.put_values(&times, ..).expect("Failed to write time");

    let mut var = file
        .add_variable::<f64>("lat", &["lat"])
        .expect("Failed to add variable lat");
    var.put_values(&lats, ..).expect("Failed to write lat");

    let mut var = file
        .add_variable::<f32>("SST", &["lat", "time"])
        .expect("Failed to add variable SST");
    var.put_attribute("units", "degC")
        .expect("Failed to add attribute");
    var.put_values(&sst, ..).expect("Failed to write SST");
}

fn netcdf_session(dir: &Path) -> Session {
    write_file(&dir.join("SST_0.nc"), 0);
    write_file(&dir.join("SST_1.nc"), 2);

    let dims = vec![Dimension::new("time"), Dimension::new("lat")];
    let mut session = Session::new(dims, Arc::new(NetcdfBackend::new()))
        .with_scan_config(ScanConfig::new().scan_attributes(true));
    session
        .add_filegroup(
            FilegroupSpec::new("sst", dir, r"SST_%(time:int)\.nc")
                .coord(CoordScanSpec::hybrid("time").scan_in_file())
                .coord(CoordScanSpec::in_file("lat").scan_in_file())
                .variable("SST"),
        )
        .expect("Failed to add filegroup");
    session.scan().expect("Failed to scan");
    session
}

#[test]
fn test_netcdf_scan_and_load() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let session = netcdf_session(temp_dir.path());

    assert_eq!(
        session.dim("time").map(|d| d.values().to_vec()),
        Some(vec![0.0, 1.0, 2.0, 3.0])
    );
    assert_eq!(
        session.dim("lat").map(|d| d.values().to_vec()),
        Some(vec![-10.0, 0.0, 10.0])
    );
    let attributes = session.attributes("SST").expect("Attributes were scanned");
    assert_eq!(attributes["units"], json!("degC"));

    // Selection spanning both files
    let selection = session
        .select([("time", Key::range(1, 4)), ("lat", Key::List(vec![2, 0]))])
        .expect("Failed to select");
    let data = session.load("SST", &selection).expect("Failed to load");
    assert_eq!(data.shape(), &[3, 2]);
    assert_eq!(data[[0, 0]], 12.0);
    assert_eq!(data[[0, 1]], 10.0);
    assert_eq!(data[[2, 0]], 32.0);
}

#[test]
fn test_netcdf_write() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let session = netcdf_session(temp_dir.path());

    let selection = session
        .select([("time", Key::Int(2)), ("lat", Key::Int(1))])
        .expect("Failed to select");
    let values = ndarray::ArrayD::from_elem(ndarray::IxDyn(&[1, 1]), -5.0_f32);
    session
        .write("SST", &selection, values.view())
        .expect("Failed to write");

    let full = session.select(Vec::<(&str, Key)>::new()).expect("Failed to select");
    let data = session.load("SST", &full).expect("Failed to load");
    assert_eq!(data[[2, 1]], -5.0);
    assert_eq!(data[[3, 1]], 31.0);
    assert_eq!(data[[1, 1]], 11.0);
}

#[test]
fn test_netcdf_strided_read() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let session = netcdf_session(temp_dir.path());

    let selection = session
        .select([("time", Key::range(0, 4)), ("lat", Key::range_step(0, 3, 2))])
        .expect("Failed to select");
    let data = session.load("SST", &selection).expect("Failed to load");
    assert_eq!(data.shape(), &[4, 2]);
    for t in 0..4 {
        assert_eq!(data[[t, 0]], (t * 10) as f32);
        assert_eq!(data[[t, 1]], (t * 10 + 2) as f32);
    }
}

#[test]
fn test_netcdf_write_keeps_skipped_positions() {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let session = netcdf_session(temp_dir.path());

    let selection = session
        .select([("time", Key::Int(3)), ("lat", Key::List(vec![2, 0]))])
        .expect("Failed to select");
    let values = ndarray::ArrayD::from_shape_vec(ndarray::IxDyn(&[2]), vec![-2.0_f32, -1.0])
        .expect("Failed to build array");
    session
        .write("SST", &selection, values.view())
        .expect("Failed to write");

    let full = session.select(Vec::<(&str, Key)>::new()).expect("Failed to select");
    let data = session.load("SST", &full).expect("Failed to load");
    assert_eq!(data[[3, 2]], -2.0);
    assert_eq!(data[[3, 0]], -1.0);
    assert_eq!(data[[3, 1]], 31.0);
    assert_eq!(data[[2, 0]], 20.0);
}
