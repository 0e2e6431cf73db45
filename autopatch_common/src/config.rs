use crate::{AutoPatchError, PatchOptions};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "autopatch.toml";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub options: PatchOptions,
    pub path: PathBuf,
    pub exists: bool,
    pub portable: bool,
}

/// Load options from `explicit`, or from the portable/platform config file.
///
/// A missing file yields defaults, except when the path was given explicitly.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, AutoPatchError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(AutoPatchError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(LoadedConfig {
            options: read_options(path)?,
            path: path.to_path_buf(),
            exists: true,
            portable: false,
        });
    }

    let (path, portable) = resolve_config_path()?;
    let exists = path.exists();

    let options = if exists {
        read_options(&path)?
    } else {
        PatchOptions::default()
    };

    Ok(LoadedConfig {
        options,
        path,
        exists,
        portable,
    })
}

pub fn save_config(path: &Path, options: &PatchOptions) -> Result<(), AutoPatchError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = toml::to_string_pretty(options)
        .map_err(|e| AutoPatchError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

fn read_options(path: &Path) -> Result<PatchOptions, AutoPatchError> {
    let data = fs::read_to_string(path)?;
    toml::from_str(&data).map_err(|e| {
        AutoPatchError::Serialization(format!("{}: {}", path.display(), e))
    })
}

fn resolve_config_path() -> Result<(PathBuf, bool), AutoPatchError> {
    if let Some(portable_path) = portable_config_path() {
        if portable_path.exists() {
            return Ok((portable_path, true));
        }
    }

    let dirs = ProjectDirs::from("", "aecs4u", "autopatch")
        .ok_or_else(|| AutoPatchError::Config("Unable to determine config directory".to_string()))?;
    Ok((dirs.config_dir().join(CONFIG_FILE_NAME), false))
}

fn portable_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
}
