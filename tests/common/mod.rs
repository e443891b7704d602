#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable stand-in for snfsdefrag that runs `body` under /bin/sh
pub fn fake_snfsdefrag(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("snfsdefrag");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Write a worklist file with one path per line
pub fn write_worklist(dir: &Path, items: &[&str]) -> PathBuf {
    let path = dir.join("worklist.txt");
    fs::write(&path, items.join("\n")).unwrap();
    path
}
