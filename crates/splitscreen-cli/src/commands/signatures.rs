//! Signatures command: print or save the built-in signature set.

use std::path::Path;

use anyhow::Result;
use splitscreen_core::{builtin_signatures, save_signatures};

pub fn run(output: Option<&Path>) -> Result<()> {
    let signatures = builtin_signatures();
    match output {
        Some(path) => {
            save_signatures(path, &signatures)?;
            eprintln!(
                "Saved {} signature entries ({}) to {}",
                signatures.entries.len(),
                signatures.version,
                path.display()
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&signatures)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use splitscreen_core::load_signatures;

    #[test]
    fn test_saved_signatures_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");

        run(Some(&path)).unwrap();

        assert_eq!(load_signatures(&path).unwrap(), builtin_signatures());
    }
}
