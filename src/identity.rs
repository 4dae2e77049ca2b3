use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use cruitchat::models::CurrentUser;
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;

// Cached identity for the console harness. The identity provider (the
// platform's login flow) supplies who the user is; this file only caches
// that answer between runs. The token is base64-encoded at rest.

#[derive(Serialize, Deserialize, Clone)]
pub struct StoredProfile {
    pub user_id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl StoredProfile {
    pub fn new(
        user_id: &str,
        display_name: &str,
        profile_picture_url: Option<String>,
        token: Option<&str>,
    ) -> Self {
        StoredProfile {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            profile_picture_url,
            token: token.map(|t| BASE64.encode(t)),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.as_ref().map(|encoded| {
            String::from_utf8(BASE64.decode(encoded).unwrap_or_default()).unwrap_or_default()
        })
    }

    pub fn current_user(&self) -> CurrentUser {
        CurrentUser {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            profile_picture_url: self.profile_picture_url.clone(),
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("cruitchat");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn save_profile(profile: &StoredProfile) -> Result<()> {
    let path = profile_path()?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, profile)?;

    info!("Profile saved for {}", profile.user_id);
    Ok(())
}

pub fn load_profile() -> Result<Option<StoredProfile>> {
    let path = profile_path()?;

    if !path.exists() {
        return Ok(None);
    }

    let path_str = path.display().to_string();

    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let profile: StoredProfile = serde_json::from_str(&contents)?;
    info!("Loaded profile for {} from {}", profile.user_id, path_str);

    Ok(Some(profile))
}

static PROFILE_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

#[cfg(test)]
pub fn set_profile_path_override(path: PathBuf) {
    let _ = PROFILE_PATH_OVERRIDE.set(path);
}

fn profile_path() -> Result<PathBuf> {
    if let Some(path) = PROFILE_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    Ok(get_config_dir()?.join("profile.json"))
}
