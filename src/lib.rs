//! # virtual-tourist
//!
//! Drop pins on a map and keep a locally cached album of Flickr photos taken
//! near each one.
//!
//! For a pin, the search client derives a bounding box around the coordinate,
//! asks the API how many result pages exist, fetches one page at random, and
//! the sampler keeps a contiguous window of at most twenty photos. The store
//! owns each pin's photo set and persists it as a YAML snapshot; images are
//! downloaded lazily and cached on their photo records.
//!
//! ## Modules
//!
//! - [`geo`]: search region around a coordinate
//! - [`flickr`]: photo search client and HTTP transport seam
//! - [`sampler`]: bounding a result page to one album
//! - [`store`]: pins, photos, and their persistence
//! - [`image`]: image downloads
//! - [`album`]: the workflows tying these together

pub mod album;
pub mod config;
pub mod error;
pub mod flickr;
pub mod geo;
pub mod image;
pub mod sampler;
pub mod store;

pub use error::{Result, TouristError};

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use std::error::Error;
    use std::fs;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn cargo_bin() -> Command {
        let cargo = StdCommand::new(env!("CARGO"))
            .arg("build")
            .output()
            .expect("Failed to build binary");

        assert!(cargo.status.success(), "Failed to build virtual-tourist");

        Command::cargo_bin("virtual-tourist").expect("Failed to find virtual-tourist binary")
    }

    /// Writes a config whose store lives inside `temp_dir` and whose API is unreachable
    fn write_config(temp_dir: &TempDir) -> Result<std::path::PathBuf, Box<dyn Error>> {
        let config_path = temp_dir.path().join("virtualtourist.yaml");
        let store_path = temp_dir.path().join("data").join("store.yaml");
        let config_content = format!(
            r#"
api_key: "test-key"
api_base_url: "http://127.0.0.1:9/services/rest/"
store_file: "{}"
"#,
            store_path.display()
        );
        fs::write(&config_path, config_content)?;
        Ok(config_path)
    }

    fn added_pin_id(stdout: &str) -> String {
        stdout
            .split_whitespace()
            .nth(2)
            .expect("add-pin should print the pin id")
            .to_string()
    }

    #[test]
    fn test_config_generation() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("virtualtourist.yaml");

        let mut cmd = cargo_bin();
        cmd.arg("init")
            .current_dir(temp_dir.path())
            .assert()
            .success();

        assert!(config_path.exists(), "Config file should be created");

        let content = fs::read_to_string(&config_path)?;
        assert!(content.contains("api_key"), "Config should contain api_key");
        assert!(
            content.contains("store_file"),
            "Config should contain store_file"
        );
        assert!(
            content.contains("album_capacity"),
            "Config should contain album_capacity"
        );

        Ok(())
    }

    #[test]
    fn test_init_command_with_force() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("virtualtourist.yaml");

        let initial_content = "api_key: keep-me";
        fs::write(&config_path, initial_content)?;

        let mut cmd = cargo_bin();
        cmd.arg("init")
            .current_dir(temp_dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Config file already exists"));

        let content = fs::read_to_string(&config_path)?;
        assert_eq!(
            content, initial_content,
            "Content should not be changed without --force"
        );

        let mut cmd = cargo_bin();
        cmd.arg("init")
            .arg("--force")
            .current_dir(temp_dir.path())
            .assert()
            .success();

        let new_content = fs::read_to_string(&config_path)?;
        assert_ne!(new_content, initial_content);
        assert!(new_content.contains("api_base_url"));

        Ok(())
    }

    #[test]
    fn test_add_list_and_remove_pin() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let config_path = write_config(&temp_dir)?;

        let output = cargo_bin()
            .args(["add-pin", "--latitude", "41.8781", "--longitude", "-87.6298"])
            .arg("--config")
            .arg(&config_path)
            .assert()
            .success();
        let stdout = String::from_utf8(output.get_output().stdout.clone())?;
        assert!(stdout.contains("Added pin"), "Should confirm the new pin");
        let pin_id = added_pin_id(&stdout);

        cargo_bin()
            .arg("pins")
            .arg("--config")
            .arg(&config_path)
            .assert()
            .success()
            .stdout(predicate::str::contains(pin_id.as_str()))
            .stdout(predicate::str::contains("0 photos"));

        cargo_bin()
            .args(["remove-pin", pin_id.as_str()])
            .arg("--config")
            .arg(&config_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed pin"));

        cargo_bin()
            .arg("pins")
            .arg("--config")
            .arg(&config_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("No pins yet"));

        Ok(())
    }

    #[test]
    fn test_add_pin_rejects_out_of_range_latitude() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let config_path = write_config(&temp_dir)?;

        cargo_bin()
            .args(["add-pin", "--latitude", "500", "--longitude", "0"])
            .arg("--config")
            .arg(&config_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid coordinate"));

        cargo_bin()
            .arg("pins")
            .arg("--config")
            .arg(&config_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("No pins yet"));

        Ok(())
    }

    #[test]
    fn test_status_command() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let config_path = write_config(&temp_dir)?;

        cargo_bin()
            .args(["add-pin", "--latitude", "51.5", "--longitude", "-0.12"])
            .arg("--config")
            .arg(&config_path)
            .assert()
            .success();

        let output = cargo_bin()
            .arg("status")
            .arg("--config")
            .arg(&config_path)
            .assert()
            .success();

        let stdout = String::from_utf8(output.get_output().stdout.clone())?;
        assert!(stdout.contains("virtual-tourist Status"));
        assert!(stdout.contains("Configuration:"));
        assert!(stdout.contains("Store file:"));
        assert!(stdout.contains("Pins: 1"));
        assert!(stdout.contains("Photos: 0"));

        Ok(())
    }

    #[test]
    fn test_album_fetch_failure_is_reported() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let config_path = write_config(&temp_dir)?;

        let output = cargo_bin()
            .args(["add-pin", "--latitude", "10", "--longitude", "10"])
            .arg("--config")
            .arg(&config_path)
            .assert()
            .success();
        let pin_id = added_pin_id(&String::from_utf8(output.get_output().stdout.clone())?);

        cargo_bin()
            .args(["album", pin_id.as_str()])
            .arg("--config")
            .arg(&config_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to fetch photos"));

        Ok(())
    }

    #[test]
    fn test_unknown_pin_is_an_error() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let config_path = write_config(&temp_dir)?;

        cargo_bin()
            .args(["remove-pin", "6f1c1c4e-8d0a-4d8e-9a4b-2f6f3f0b7a11"])
            .arg("--config")
            .arg(&config_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("pin not found"));

        Ok(())
    }

    #[test]
    fn test_missing_config_error() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let nonexistent_path = temp_dir.path().join("does_not_exist.yaml");

        let mut cmd = cargo_bin();
        cmd.arg("pins")
            .arg("--config")
            .arg(&nonexistent_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Config file not found"));

        Ok(())
    }
}
