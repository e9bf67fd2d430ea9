use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::PathBuf,
};

use crate::gestures::LabelMap;
use crate::sampler::SamplerSettings;
use crate::video;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thresholds {
    pub min_confidence: f32,
    pub debounce_ms: u64,
    pub ready_poll_ms: u64,
    /// 0 = poll video readiness forever.
    #[serde(default)]
    pub ready_max_attempts: u32,
    pub frame_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Source {
    /// Replay script driving the synthetic pipeline; none leaves the
    /// pipeline idle until gestures are injected manually.
    pub replay: Option<PathBuf>,
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,
}

fn default_warmup_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    pub thresholds: Thresholds,
    /// Classifier label string → gesture name (one|two|three|four|thumb_up).
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub source: Source,
}

impl Profile {
    pub fn label_map(&self) -> Result<LabelMap> {
        LabelMap::from_table(&self.labels)
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            min_confidence: self.thresholds.min_confidence,
            debounce_ms: self.thresholds.debounce_ms,
            ready_poll_ms: self.thresholds.ready_poll_ms,
            ready_max_attempts: self.thresholds.ready_max_attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
    pub detected_cameras: Vec<String>,
}

fn config_dir() -> Result<PathBuf> {
    let user = UserDirs::new().ok_or_else(|| anyhow!("no home directory"))?;
    Ok(user.home_dir().join(".config").join("quizctl"))
}

fn profiles_dir() -> Result<PathBuf> {
    Ok(config_dir()?.join("profiles"))
}

fn active_ptr_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("active"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        let cfgdir = config_dir()?;
        let profdir = profiles_dir()?;
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = active_ptr_path()?;
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = Self::load_profile(&active_name)?;
        let detected_cameras = video::discover_cameras()
            .into_iter()
            .map(|d| d.path)
            .collect();

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
            detected_cameras,
        })
    }

    /// Reload the active profile; keeps the last good one on error.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = Self::load_profile(&self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.reload()?;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                if let Some(ext) = e.path().extension() {
                    if ext == "toml" {
                        if let Some(stem) = e.path().file_stem().and_then(|s| s.to_str()) {
                            v.push(stem.to_string());
                        }
                    }
                }
            }
        }
        v.sort();
        v
    }

    fn load_profile(name: &str) -> Result<Profile> {
        let path = profiles_dir()?.join(format!("{name}.toml"));
        let txt = fs::read_to_string(&path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        let profile: Profile =
            toml::from_str(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let in_video_group = check_in_video_group();
        serde_json::json!({
            "cameras": self.detected_cameras,
            "video_group_member": in_video_group,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "replay_source": self.profile.source.replay,
            "hints": {
                "add_user_to_video_group": "sudo usermod -aG video $USER && newgrp video",
                "replay_without_camera": "set [source] replay = \"<script.toml>\" in the active profile"
            }
        })
    }
}

fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    if !(0.0..=1.0).contains(&th.min_confidence) || th.min_confidence == 0.0 {
        return Err(anyhow!("thresholds.min_confidence must be in (0,1]"));
    }
    if th.debounce_ms == 0 || th.ready_poll_ms == 0 || th.frame_interval_ms == 0 {
        return Err(anyhow!("thresholds must be positive durations"));
    }

    // surfaces empty tables and unknown gesture names
    p.label_map()?;

    if let Some(replay) = &p.source.replay {
        if replay.as_os_str().is_empty() {
            return Err(anyhow!("source.replay must not be empty when set"));
        }
    }
    Ok(())
}

fn check_in_video_group() -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        for line in s.lines() {
            if line.starts_with("video:") {
                if line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
                {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Profile> {
        let profile: Profile = toml::from_str(text)?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    #[test]
    fn default_profile_template_is_valid() {
        let profile = parse(default_profile_text()).unwrap();
        assert_eq!(profile.thresholds.min_confidence, 0.70);
        assert_eq!(profile.thresholds.debounce_ms, 1000);
        assert_eq!(profile.labels.len(), 5);
        profile.label_map().unwrap();
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let text = r#"
            [meta]
            [thresholds]
            min_confidence = 1.3
            debounce_ms = 1000
            ready_poll_ms = 100
            frame_interval_ms = 16
            [labels]
            Thumb_Up = "thumb_up"
        "#;
        assert!(parse(text).is_err());
    }

    #[test]
    fn rejects_unknown_gesture_names() {
        let text = r#"
            [meta]
            [thresholds]
            min_confidence = 0.7
            debounce_ms = 1000
            ready_poll_ms = 100
            frame_interval_ms = 16
            [labels]
            Closed_Fist = "five"
        "#;
        assert!(parse(text).is_err());
    }

    #[test]
    fn rejects_zero_durations() {
        let text = r#"
            [meta]
            [thresholds]
            min_confidence = 0.7
            debounce_ms = 0
            ready_poll_ms = 100
            frame_interval_ms = 16
            [labels]
            Thumb_Up = "thumb_up"
        "#;
        assert!(parse(text).is_err());
    }

    #[test]
    fn source_section_is_optional() {
        let text = r#"
            [meta]
            name = "bare"
            [thresholds]
            min_confidence = 0.7
            debounce_ms = 1000
            ready_poll_ms = 100
            ready_max_attempts = 50
            frame_interval_ms = 16
            [labels]
            Thumb_Up = "thumb_up"
        "#;
        let profile = parse(text).unwrap();
        assert!(profile.source.replay.is_none());
        assert_eq!(profile.source.warmup_ms, 250);
        assert_eq!(profile.sampler_settings().ready_max_attempts, 50);
    }
}
