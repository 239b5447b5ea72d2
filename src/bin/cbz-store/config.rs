use std::{fs, io, path::PathBuf};

use cbz_store_core::cfg::StoreConfig;

const CONFIG_FILE: &str = "cbz-store.toml";

#[derive(serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    pub dirs: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_dir: Option<PathBuf>,
    pub store: StoreConfig
}
impl Default for Config {
    fn default() -> Self {
        Self { dirs: vec![PathBuf::from("library")], default_dir: None, store: StoreConfig::default() }
    }
}

fn path_to_config(path: Option<PathBuf>) -> io::Result<PathBuf> {
    match path {
        Some(p) => {
            let meta = fs::metadata(&p)?;
            Ok(if meta.is_dir() {
                p.join(CONFIG_FILE)
            } else {
                p
            })
        }
        None => Ok(PathBuf::from(CONFIG_FILE))
    }
}

pub fn read_config(path: Option<PathBuf>) -> io::Result<Config> {
    let path = path_to_config(path)?;
    let f = fs::read_to_string(path)?;
    toml::from_str(&f).map_err(io::Error::other)
}

/// Returns `false` if the config file was missing and defaults were written.
pub fn check(path: Option<PathBuf>) -> io::Result<bool> {
    let path = path_to_config(path)?;
    let f = match fs::read_to_string(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let s = toml::to_string(&Config::default()).map_err(io::Error::other)?;
            fs::write(path, s)?;
            return Ok(false);
        }
        Err(e) => return Err(e)
    };
    toml::from_str::<Config>(&f).map_err(io::Error::other)?;
    Ok(true)
}
