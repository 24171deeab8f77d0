use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::PathBuf;

fn is_env_key(literal: &str) -> bool {
    literal.len() > "TRAIL_".len()
        && literal.starts_with("TRAIL_")
        && literal
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

/// Every string literal under `src/` that is exactly a `TRAIL_*` key.
fn scan_env_keys() -> std::io::Result<BTreeSet<String>> {
    let mut keys = BTreeSet::new();
    let mut pending = vec![PathBuf::from("src")];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            if path.extension().is_none_or(|ext| ext != "rs") {
                continue;
            }
            let source = fs::read_to_string(&path)?;
            keys.extend(
                source
                    .split('"')
                    .filter(|piece| is_env_key(piece))
                    .map(str::to_owned),
            );
        }
    }
    Ok(keys)
}

fn main() -> std::io::Result<()> {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");

    let body = scan_env_keys()?
        .iter()
        .map(|key| format!("    {key:?},\n"))
        .collect::<String>();
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR not set")
    })?);
    fs::write(
        out_dir.join("trail_env_keys.rs"),
        format!("pub const GENERATED_TRAIL_ENV_KEYS: &[&str] = &[\n{body}];\n"),
    )
}
