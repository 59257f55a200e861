use std::fs;

use tempfile::tempdir;

use crate::utils::fs::write_atomic;

#[test]
fn test_write_atomic_creates_parents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a").join("b").join("state.json");

    write_atomic(&path, b"{}").unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
}

#[test]
fn test_write_atomic_replaces_content_without_leftovers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    write_atomic(&path, "first version").unwrap();
    write_atomic(&path, "second").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, vec!["state.json"]);
}

#[test]
fn test_write_atomic_fails_when_target_is_a_directory() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("occupied");
    fs::create_dir(&target).unwrap();
    fs::write(target.join("keep"), "x").unwrap();

    assert!(write_atomic(&target, "data").is_err());
    // The temporary sibling is cleaned up
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_write_atomic_concurrent_writers() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shared.json");

    let handles: Vec<_> = (0..4)
        .map(|writer| {
            let path = path.clone();
            std::thread::spawn(move || {
                for round in 0..100 {
                    write_atomic(&path, format!("writer {writer} round {round}")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("writer ") && content.ends_with("round 99"));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}
