use std::path::Path;

use anyhow::bail;

use launchpad_core::LaunchpadConfig;

pub fn init(
    path: &Path,
    stack: &str,
    environment: &str,
    application: &str,
    force: bool,
) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let config = LaunchpadConfig::scaffold(stack, environment, application);
    let identity = config.stack_identity()?;
    std::fs::write(path, config.to_toml_string()?)?;

    println!("✓ Generated {}", path.display());
    println!("  Stack:  {identity}");
    println!("  Bucket: {}", identity.bucket_name()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_loadable_scaffold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launchpad.toml");
        init(&path, "srv", "dev", "backend", false).unwrap();

        let config = LaunchpadConfig::from_file(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.application.name, "backend");
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launchpad.toml");
        std::fs::write(&path, "# mine").unwrap();

        assert!(init(&path, "srv", "dev", "backend", false).is_err());
        init(&path, "srv", "dev", "backend", true).unwrap();
        assert_ne!(std::fs::read_to_string(&path).unwrap(), "# mine");
    }

    #[test]
    fn rejects_invalid_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launchpad.toml");
        assert!(init(&path, "Bad-Name", "dev", "backend", false).is_err());
        assert!(!path.exists());
    }
}
