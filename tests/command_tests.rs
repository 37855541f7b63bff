//! Tests for command generation and merging

mod common;

use common::{command_files, touch_all, MockBackend, MockFile};
use filecube::backend::NoBackend;
use filecube::config::{CoordScanSpec, FilegroupSpec};
use filecube::dimension::Dimension;
use filecube::errors::{FilecubeError, Result};
use filecube::filegroup::{merge_cmd_per_file, Command};
use filecube::keyring::{Key, Keyring};
use filecube::session::Session;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

/// Register a file holding `times` along a time axis
fn add_block(backend: &MockBackend, dir: &Path, name: &str, times: std::ops::Range<usize>) {
    let values = times.map(|t| t as f64).collect();
    backend.add_file(dir, name, MockFile::new().coord("time", values));
}

fn hybrid_spec(name: &str, dir: &Path, prefix: &str) -> FilegroupSpec {
    FilegroupSpec::new(name, dir, format!(r"{prefix}_%(time:int)\.nc"))
        .coord(CoordScanSpec::hybrid("time").scan_in_file())
}

/// Two files of ten time steps each
fn blocks_session(dir: &Path) -> Result<Session> {
    let backend = Arc::new(MockBackend::new());
    add_block(&backend, dir, "T_0.nc", 0..10);
    add_block(&backend, dir, "T_1.nc", 10..20);

    let mut session = Session::new(vec![Dimension::new("time")], backend);
    session.add_filegroup(hybrid_spec("t", dir, "T"))?;
    session.scan()?;
    Ok(session)
}

fn single_pair(cmd: &Command) -> (&Keyring, &Keyring) {
    assert_eq!(cmd.len(), 1, "expected one pair in {cmd}");
    let pair = &cmd.pairs()[0];
    (&pair.infile, &pair.memory)
}

#[test]
fn test_contiguous_selection_merged_into_one_range() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let session = blocks_session(dir.path())?;

    let selection = session.select([("time", Key::List(vec![5, 6, 7, 8]))])?;
    let commands = session.commands(&selection)?;
    assert_eq!(commands.len(), 1);
    let (_, cmds) = &commands[0];
    assert_eq!(command_files(cmds, dir.path()), vec!["T_0.nc"]);

    let (infile, memory) = single_pair(&cmds[0]);
    assert_eq!(infile.get("time"), Some(&Key::range(5, 9)));
    assert_eq!(memory.get("time"), Some(&Key::range(0, 4)));
    Ok(())
}

#[test]
fn test_selection_across_files() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let session = blocks_session(dir.path())?;

    let selection = session.select([("time", Key::range(8, 12))])?;
    let commands = session.commands(&selection)?;
    let (_, cmds) = &commands[0];
    assert_eq!(command_files(cmds, dir.path()), vec!["T_0.nc", "T_1.nc"]);

    let (infile, memory) = single_pair(&cmds[0]);
    assert_eq!(infile.get("time"), Some(&Key::range(8, 10)));
    assert_eq!(memory.get("time"), Some(&Key::range(0, 2)));

    let (infile, memory) = single_pair(&cmds[1]);
    assert_eq!(infile.get("time"), Some(&Key::range(0, 2)));
    assert_eq!(memory.get("time"), Some(&Key::range(2, 4)));
    Ok(())
}

#[test]
fn test_strided_and_single_selections() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let session = blocks_session(dir.path())?;

    let selection = session.select([("time", Key::range_step(0, 10, 2))])?;
    let commands = session.commands(&selection)?;
    let (infile, memory) = single_pair(&commands[0].1[0]);
    assert_eq!(infile.get("time"), Some(&Key::range_step(0, 10, 2)));
    assert_eq!(memory.get("time"), Some(&Key::range(0, 5)));

    // A single index gives integer keys
    let selection = session.select([("time", Key::Int(13))])?;
    let commands = session.commands(&selection)?;
    let cmds = &commands[0].1;
    assert_eq!(command_files(cmds, dir.path()), vec!["T_1.nc"]);
    let (infile, memory) = single_pair(&cmds[0]);
    assert_eq!(infile.get("time"), Some(&Key::Int(3)));
    assert_eq!(memory.get("time"), Some(&Key::Int(0)));
    Ok(())
}

/// Filegroups `a` (times 0..5) and `b` (times 5..10), one file each
fn disjoint_session(root: &Path) -> Result<Session> {
    let (dir_a, dir_b) = (root.join("a"), root.join("b"));
    let backend = Arc::new(MockBackend::new());
    add_block(&backend, &dir_a, "A_0.nc", 0..5);
    add_block(&backend, &dir_b, "B_1.nc", 5..10);

    let mut session = Session::new(vec![Dimension::new("time")], backend);
    session.add_filegroup(hybrid_spec("a", &dir_a, "A"))?;
    session.add_filegroup(hybrid_spec("b", &dir_b, "B"))?;
    session.scan()?;
    Ok(session)
}

#[test]
fn test_selection_missing_from_filegroup() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let session = disjoint_session(dir.path())?;
    assert_eq!(session.dim("time").map(Dimension::size), Some(10));

    let selection = session.select([("time", Key::Int(7))])?;
    let fg_a = session.filegroup("a").expect("filegroup exists");
    assert!(fg_a.commands_from_available(&selection)?.is_empty());
    assert!(fg_a.get_fg_keyrings(&selection)?.is_none());

    let commands = session.commands(&selection)?;
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].0, "b");
    Ok(())
}

#[test]
fn test_selection_spanning_two_filegroups() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let session = disjoint_session(dir.path())?;

    let selection = session.select([("time", Key::range(3, 8))])?;
    let commands = session.commands(&selection)?;
    assert_eq!(commands.len(), 2);

    let (name, cmds) = &commands[0];
    assert_eq!(name, "a");
    assert_eq!(cmds.len(), 1);
    cmds[0].check_shapes()?;
    let (infile, memory) = single_pair(&cmds[0]);
    assert_eq!(infile.get("time"), Some(&Key::range(3, 5)));
    assert_eq!(memory.get("time"), Some(&Key::range(0, 2)));

    let (name, cmds) = &commands[1];
    assert_eq!(name, "b");
    assert_eq!(cmds.len(), 1);
    cmds[0].check_shapes()?;
    let (infile, memory) = single_pair(&cmds[0]);
    assert_eq!(infile.get("time"), Some(&Key::range(0, 3)));
    assert_eq!(memory.get("time"), Some(&Key::range(2, 5)));
    Ok(())
}

#[test]
fn test_absent_positions_are_dropped() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let session = disjoint_session(dir.path())?;

    // 3 and 4 are in `a`, 5 is in `b`
    let selection = session.select([("time", Key::List(vec![3, 5, 4]))])?;
    let fg_a = session.filegroup("a").expect("filegroup exists");
    let pair = fg_a.get_fg_keyrings(&selection)?.expect("a holds part of the selection");
    assert_eq!(pair.infile.get("time"), Some(&Key::range(3, 5)));
    assert_eq!(pair.memory.get("time"), Some(&Key::range_step(0, 4, 2)));

    let cmds = fg_a.commands_from_available(&selection)?;
    let (infile, memory) = single_pair(&cmds[0]);
    assert_eq!(infile.get("time"), Some(&Key::range(3, 5)));
    assert_eq!(memory.get("time"), Some(&Key::range_step(0, 4, 2)));
    Ok(())
}

#[test]
fn test_shared_coordinate_commands() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    touch_all(dir.path(), &["SST_0_10.5.nc", "SST_1_10.5.nc", "SST_2_10.5.nc"]);

    let dims = vec![Dimension::new("time"), Dimension::with_values("lat", vec![10.5])];
    let mut session = Session::new(dims, Arc::new(NoBackend));
    session.add_filegroup(
        FilegroupSpec::new("sst", dir.path(), r"%(prefix)_%(time:int)_%(lat:float)\.nc")
            .replace("prefix", "SST")
            .coord(CoordScanSpec::shared("time"))
            .coord(CoordScanSpec::in_file("lat")),
    )?;
    session.scan()?;

    let selection = session.select(Vec::<(&str, Key)>::new())?;
    assert_eq!(selection.to_string(), "time: 0:3, lat: 0:1");

    let commands = session.commands(&selection)?;
    let cmds = &commands[0].1;
    assert_eq!(
        command_files(cmds, dir.path()),
        vec!["SST_0_10.5.nc", "SST_1_10.5.nc", "SST_2_10.5.nc"]
    );
    for (i, cmd) in cmds.iter().enumerate() {
        let (infile, memory) = single_pair(cmd);
        // time is not an axis of the files
        assert_eq!(infile.dims(), vec!["time", "lat"]);
        assert_eq!(infile.get("time"), Some(&Key::None));
        assert_eq!(infile.get("lat"), Some(&Key::Int(0)));
        assert_eq!(memory.get("time"), Some(&Key::Int(i)));
        assert_eq!(memory.get("lat"), Some(&Key::Int(0)));
        assert!(infile.is_shape_equivalent(memory));
    }
    Ok(())
}

#[test]
fn test_commands_follow_selection_order() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    touch_all(dir.path(), &["T_0_5.nc", "T_0_10.nc", "T_1_5.nc", "T_1_10.nc"]);

    let dims = vec![Dimension::new("time"), Dimension::new("depth")];
    let mut session = Session::new(dims, Arc::new(NoBackend));
    session.add_filegroup(
        FilegroupSpec::new("t", dir.path(), r"T_%(time:int)_%(depth:int)\.nc")
            .coord(CoordScanSpec::shared("time"))
            .coord(CoordScanSpec::shared("depth")),
    )?;
    session.scan()?;

    // Last dimension varies fastest
    let selection = session.select(Vec::<(&str, Key)>::new())?;
    let commands = session.commands(&selection)?;
    let cmds = &commands[0].1;
    assert_eq!(
        command_files(cmds, dir.path()),
        vec!["T_0_5.nc", "T_0_10.nc", "T_1_5.nc", "T_1_10.nc"]
    );
    let (_, memory) = single_pair(&cmds[2]);
    assert_eq!(memory.get("time"), Some(&Key::Int(1)));
    assert_eq!(memory.get("depth"), Some(&Key::Int(0)));

    // A reversed list visits files in the requested order
    let selection = session.select([("time", Key::List(vec![1, 0])), ("depth", Key::Int(1))])?;
    let commands = session.commands(&selection)?;
    let cmds = &commands[0].1;
    assert_eq!(command_files(cmds, dir.path()), vec!["T_1_10.nc", "T_0_10.nc"]);
    let (_, memory) = single_pair(&cmds[1]);
    assert_eq!(memory.get("time"), Some(&Key::Int(1)));
    Ok(())
}

#[test]
fn test_filegroup_without_shared_coordinate() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    touch_all(dir.path(), &["static.nc"]);

    let dims = vec![Dimension::with_values("lat", vec![1.0, 2.0, 3.0])];
    let mut session = Session::new(dims, Arc::new(NoBackend));
    session.add_filegroup(
        FilegroupSpec::new("static", dir.path(), r"static\.nc").coord(CoordScanSpec::in_file("lat")),
    )?;
    session.scan()?;

    let selection = session.select([("lat", Key::List(vec![2, 0]))])?;
    let commands = session.commands(&selection)?;
    let cmds = &commands[0].1;
    assert_eq!(command_files(cmds, dir.path()), vec!["static.nc"]);
    let (infile, memory) = single_pair(&cmds[0]);
    assert_eq!(infile.get("lat"), Some(&Key::List(vec![2, 0])));
    assert_eq!(memory.get("lat"), Some(&Key::range(0, 2)));
    Ok(())
}

#[test]
fn test_invalid_selections() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let session = blocks_session(dir.path())?;

    match session.select([("time", Key::Int(20))]) {
        Err(FilecubeError::InvalidKey { dim, .. }) => assert_eq!(dim, "time"),
        other => panic!("Expected InvalidKey error, got {other:?}"),
    }
    match session.select([("time", Key::range(0, 1 << 60))]) {
        Err(FilecubeError::InvalidKey { dim, message }) => {
            assert_eq!(dim, "time");
            assert!(message.contains(&((1_usize << 60) - 1).to_string()));
        }
        other => panic!("Expected InvalidKey error, got {other:?}"),
    }
    match session.select([("depth", Key::Int(0))]) {
        Err(FilecubeError::DimensionNotFound { dim }) => assert_eq!(dim, "depth"),
        other => panic!("Expected DimensionNotFound error, got {other:?}"),
    }
    assert!(session.select([("time", Key::None)]).is_err());
    Ok(())
}

#[test]
fn test_commands_before_scan() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut session = Session::new(vec![Dimension::new("time")], Arc::new(NoBackend));
    session
        .add_filegroup(
            FilegroupSpec::new("a", dir.path(), r"A_%(time:int)\.nc").coord(CoordScanSpec::shared("time")),
        )
        .expect("Failed to add filegroup");

    let selection = Keyring::from_pairs([("time", Key::Int(0))]);
    assert!(matches!(session.commands(&selection), Err(FilecubeError::Config(_))));
}

#[test]
fn test_merge_per_file() {
    let mut commands = Vec::new();
    for (file, t) in [("a.nc", 0), ("b.nc", 1), ("a.nc", 2)] {
        let mut cmd = Command::new(file);
        cmd.append(
            Keyring::from_pairs([("time", Key::Int(t))]),
            Keyring::from_pairs([("time", Key::Int(t))]),
        );
        commands.push(cmd);
    }

    let merged = merge_cmd_per_file(commands);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].filename(), Path::new("a.nc"));
    assert_eq!(merged[0].len(), 2);
    assert_eq!(merged[1].filename(), Path::new("b.nc"));
    assert_eq!(merged[1].len(), 1);
}

#[test]
fn test_merge_keys() {
    let mut cmd = Command::new("a.nc");
    for (t, m) in [(1, 0), (3, 1), (5, 2)] {
        cmd.append(
            Keyring::from_pairs([("time", Key::Int(t)), ("lat", Key::range(0, 4))]),
            Keyring::from_pairs([("time", Key::Int(m)), ("lat", Key::range(0, 4))]),
        );
    }
    // Different lat key: cannot be stacked with the others
    cmd.append(
        Keyring::from_pairs([("time", Key::Int(7)), ("lat", Key::Int(0))]),
        Keyring::from_pairs([("time", Key::Int(3)), ("lat", Key::Int(0))]),
    );

    cmd.merge_keys(&["time"]);
    assert_eq!(cmd.len(), 2);
    let pair = &cmd.pairs()[0];
    assert_eq!(pair.infile.get("time"), Some(&Key::range_step(1, 7, 2)));
    assert_eq!(pair.memory.get("time"), Some(&Key::range(0, 3)));
    assert!(cmd.check_shapes().is_ok());

    // Keys outside of the files are never stacked
    let mut cmd = Command::new("b.nc");
    for m in 0..2 {
        cmd.append(
            Keyring::from_pairs([("time", Key::None)]),
            Keyring::from_pairs([("time", Key::Int(m))]),
        );
    }
    cmd.merge_keys(&["time"]);
    assert_eq!(cmd.len(), 2);
}

#[test]
fn test_check_shapes() {
    let mut cmd = Command::new("a.nc");
    cmd.append(
        Keyring::from_pairs([("time", Key::range(0, 3))]),
        Keyring::from_pairs([("time", Key::range(0, 2))]),
    );
    assert!(matches!(cmd.check_shapes(), Err(FilecubeError::ShapeMismatch(_))));
}
