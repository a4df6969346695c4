//! Environment-based settings.
//!
//! See the [crate documentation](crate) for the list of recognized variables.

use std::{
    env::{self, VarError},
    ffi::OsString,
    path::{Path, PathBuf},
    process,
};

use once_cell::sync::Lazy;

const MODEL_DIR_VAR: &str = "FINGERCOUNT_MODEL_DIR";
const NETWORKS_VAR: &str = "FINGERCOUNT_NETWORKS";
const WEBCAM_NAME_VAR: &str = "FINGERCOUNT_WEBCAM_NAME";

const DEFAULT_MODEL_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../3rdparty/onnx");

static SETTINGS: Lazy<Settings> = Lazy::new(|| match Settings::from_vars(|var| env::var(var)) {
    Ok(settings) => {
        log::debug!("{:?}", settings);
        settings
    }
    Err(e) => {
        eprintln!("{e}; exiting");
        process::exit(1);
    }
});

/// Which variant of the pose and hand landmark networks to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkVariant {
    /// More accurate, but slower.
    #[default]
    Full,
    /// Faster, but less accurate.
    Lite,
}

impl NetworkVariant {
    fn suffix(self) -> &'static str {
        match self {
            NetworkVariant::Full => "full",
            NetworkVariant::Lite => "lite",
        }
    }
}

/// Settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    model_dir: PathBuf,
    networks: NetworkVariant,
    webcam_name: Option<String>,
}

/// An environment variable with an unusable value.
#[derive(Debug, thiserror::Error)]
#[error("invalid value set for `{name}` variable: '{}'", value.to_string_lossy())]
pub struct InvalidVar {
    name: &'static str,
    value: OsString,
}

impl Settings {
    /// Returns the process-wide settings, reading them from the environment on first use.
    ///
    /// If any variable has an invalid value, a message is printed and the process exits with
    /// status 1.
    pub fn get() -> &'static Settings {
        &SETTINGS
    }

    /// Reads the settings using `var` to look up environment variables.
    pub fn from_vars<F>(var: F) -> Result<Self, InvalidVar>
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        let lookup = |name: &'static str| match var(name) {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(value)) => Err(InvalidVar { name, value }),
        };

        let model_dir = lookup(MODEL_DIR_VAR)?
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR));
        let networks = match lookup(NETWORKS_VAR)?.as_deref() {
            None | Some("full") => NetworkVariant::Full,
            Some("lite") => NetworkVariant::Lite,
            Some(invalid) => {
                return Err(InvalidVar {
                    name: NETWORKS_VAR,
                    value: invalid.into(),
                })
            }
        };
        let webcam_name = lookup(WEBCAM_NAME_VAR)?;

        Ok(Self {
            model_dir,
            networks,
            webcam_name,
        })
    }

    #[inline]
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    #[inline]
    pub fn networks(&self) -> NetworkVariant {
        self.networks
    }

    /// The name of the webcam to open instead of the default device, if configured.
    #[inline]
    pub fn webcam_name(&self) -> Option<&str> {
        self.webcam_name.as_deref()
    }

    pub fn pose_model(&self) -> PathBuf {
        self.model_dir
            .join(format!("pose_landmark_{}.onnx", self.networks.suffix()))
    }

    pub fn hand_model(&self) -> PathBuf {
        self.model_dir
            .join(format!("hand_landmark_{}.onnx", self.networks.suffix()))
    }

    pub fn face_model(&self) -> PathBuf {
        self.model_dir.join("face_landmark.onnx")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, InvalidVar> {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        Settings::from_vars(|name| {
            vars.get(name)
                .map(|v| v.to_string())
                .ok_or(VarError::NotPresent)
        })
    }

    #[test]
    fn defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.networks(), NetworkVariant::Full);
        assert_eq!(s.webcam_name(), None);
        assert!(s.model_dir().ends_with("3rdparty/onnx"));
        assert!(s.pose_model().ends_with("pose_landmark_full.onnx"));
        assert!(s.face_model().ends_with("face_landmark.onnx"));
    }

    #[test]
    fn overrides() {
        let s = settings(&[
            (MODEL_DIR_VAR, "/opt/models"),
            (NETWORKS_VAR, "lite"),
            (WEBCAM_NAME_VAR, "HD Pro Webcam C920"),
        ])
        .unwrap();
        assert_eq!(s.hand_model(), Path::new("/opt/models/hand_landmark_lite.onnx"));
        assert_eq!(s.pose_model(), Path::new("/opt/models/pose_landmark_lite.onnx"));
        assert_eq!(s.webcam_name(), Some("HD Pro Webcam C920"));
    }

    #[test]
    fn empty_means_unset() {
        let s = settings(&[(NETWORKS_VAR, ""), (WEBCAM_NAME_VAR, "")]).unwrap();
        assert_eq!(s.networks(), NetworkVariant::Full);
        assert_eq!(s.webcam_name(), None);
    }

    #[test]
    fn invalid_variant() {
        let err = settings(&[(NETWORKS_VAR, "heavy")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value set for `FINGERCOUNT_NETWORKS` variable: 'heavy'"
        );
    }

    #[test]
    fn non_unicode_value() {
        use std::os::unix::ffi::OsStringExt;

        let err = Settings::from_vars(|name| match name {
            WEBCAM_NAME_VAR => Err(VarError::NotUnicode(OsString::from_vec(vec![b'c', 0xff]))),
            _ => Err(VarError::NotPresent),
        })
        .unwrap_err();
        let source: &dyn std::error::Error = &err;
        assert_eq!(
            source.to_string(),
            "invalid value set for `FINGERCOUNT_WEBCAM_NAME` variable: 'c\u{FFFD}'"
        );
    }
}
