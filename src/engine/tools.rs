//! Locating (and if needed downloading) the ffmpeg binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{AudioToolsError, Result};

static FFMPEG_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ffmpeg version n?(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("valid regex"));

/// An external binary the library depends on
#[derive(Debug, Clone, Serialize)]
pub struct ExternalTool {
    pub name: String,
    pub path: PathBuf,
    pub version: Option<Version>,
    pub min_version: Version,
}

impl ExternalTool {
    pub fn is_supported(&self) -> bool {
        // Нераспознанную версию (git-сборки) принимаем
        self.version.as_ref().map_or(true, |v| v >= &self.min_version)
    }
}

fn binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

/// Find a usable ffmpeg: explicit path, then `PATH`, then the download cache,
/// then a fresh download. Every failure is reported as an engine load error.
pub async fn locate_ffmpeg(config: &EngineConfig) -> Result<ExternalTool> {
    let min_version = Version::parse(&config.min_version)
        .map_err(|e| AudioToolsError::Configuration(format!("bad min_version: {}", e)))?;

    if let Some(path) = &config.ffmpeg_path {
        return require_supported(inspect(path, &min_version).await?);
    }

    let mut candidates = Vec::new();
    match which::which(binary_name()) {
        Ok(path) => candidates.push(path),
        Err(_) => debug!("ffmpeg is not in PATH"),
    }
    if let Some(path) = find_in_dir(&config.tools_dir) {
        candidates.push(path);
    }

    for path in candidates {
        match inspect(&path, &min_version).await {
            Ok(tool) if tool.is_supported() => {
                info!("Using ffmpeg at {} ({:?})", tool.path.display(), tool.version);
                return Ok(tool);
            }
            Ok(tool) => warn!("ffmpeg at {} is too old ({:?})", tool.path.display(), tool.version),
            Err(e) => warn!("ffmpeg at {} is unusable: {}", path.display(), e),
        }
    }

    if !config.allow_download {
        return Err(AudioToolsError::EngineLoad(
            "ffmpeg not found and downloading is disabled".to_string(),
        ));
    }

    info!("ffmpeg not found, downloading a static build");
    let path = download_ffmpeg(config)
        .await
        .map_err(|e| AudioToolsError::EngineLoad(format!("failed to download ffmpeg: {}", e)))?;
    require_supported(inspect(&path, &min_version).await?)
}

fn require_supported(tool: ExternalTool) -> Result<ExternalTool> {
    if !tool.is_supported() {
        return Err(AudioToolsError::EngineLoad(format!(
            "ffmpeg at {} is older than {}",
            tool.path.display(),
            tool.min_version
        )));
    }
    Ok(tool)
}

/// Run `ffmpeg -version` and parse the result
async fn inspect(path: &Path, min_version: &Version) -> Result<ExternalTool> {
    let output = tokio::process::Command::new(path)
        .arg("-version")
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AudioToolsError::EngineLoad(format!("failed to execute {}: {}", path.display(), e)))?;

    if !output.status.success() {
        return Err(AudioToolsError::EngineLoad(format!(
            "{} -version exited with {}",
            path.display(),
            output.status
        )));
    }

    let version = parse_ffmpeg_version(&String::from_utf8_lossy(&output.stdout));
    if version.is_none() {
        debug!("Could not parse ffmpeg version of {}", path.display());
    }

    Ok(ExternalTool {
        name: "ffmpeg".to_string(),
        path: path.to_path_buf(),
        version,
        min_version: min_version.clone(),
    })
}

/// Parse the first line of `ffmpeg -version`
pub fn parse_ffmpeg_version(output: &str) -> Option<Version> {
    let caps = FFMPEG_VERSION_RE.captures(output)?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok()).unwrap_or(0);
    Some(Version::new(part(1), part(2), part(3)))
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    if !dir.exists() {
        return None;
    }
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == binary_name())
        .map(|entry| entry.into_path())
}

/// Download and unpack a static ffmpeg build into `tools_dir`
async fn download_ffmpeg(config: &EngineConfig) -> Result<PathBuf> {
    let url = config
        .download_url()
        .ok_or_else(|| AudioToolsError::EngineLoad("unsupported operating system".to_string()))?;

    tokio::fs::create_dir_all(&config.tools_dir).await?;

    info!("Downloading ffmpeg from {}", url);
    let response = reqwest::get(url).await?.error_for_status()?;
    let content = response.bytes().await?;

    let temp_dir = tempfile::tempdir()?;
    let archive_path = temp_dir.path().join(if url.ends_with(".tar.xz") {
        "ffmpeg.tar.xz"
    } else {
        "ffmpeg.zip"
    });
    tokio::fs::write(&archive_path, &content).await?;

    let target_dir = config.tools_dir.clone();
    let ffmpeg_path = tokio::task::spawn_blocking(move || extract_ffmpeg(&archive_path, &target_dir))
        .await
        .map_err(|e| AudioToolsError::EngineLoad(format!("extraction task failed: {}", e)))??;

    // temp_dir удаляется вместе с архивом
    drop(temp_dir);
    Ok(ffmpeg_path)
}

fn extract_ffmpeg(archive_path: &Path, target_dir: &Path) -> Result<PathBuf> {
    let is_tar = archive_path
        .to_str()
        .map_or(false, |p| p.ends_with(".tar.xz"));

    if is_tar {
        let status = std::process::Command::new("tar")
            .arg("-xf")
            .arg(archive_path)
            .arg("-C")
            .arg(target_dir)
            .status()?;
        if !status.success() {
            return Err(AudioToolsError::EngineLoad("failed to extract tar.xz archive".to_string()));
        }
    } else {
        let file = std::fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(std::io::BufReader::new(file))
            .map_err(|e| AudioToolsError::EngineLoad(format!("invalid zip archive: {}", e)))?;
        archive
            .extract(target_dir)
            .map_err(|e| AudioToolsError::EngineLoad(format!("failed to extract zip archive: {}", e)))?;
    }

    let ffmpeg_path = find_in_dir(target_dir)
        .ok_or_else(|| AudioToolsError::EngineLoad("ffmpeg executable not found in archive".to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&ffmpeg_path, std::fs::Permissions::from_mode(0o755))?;
    }

    Ok(ffmpeg_path)
}
