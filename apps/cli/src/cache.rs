use std::{
    hash::{DefaultHasher, Hash, Hasher},
    path::{Path, PathBuf},
};

/// Get the cache directory for a given source video under `root`
pub fn get_cache_dir_in(root: &Path, source: &Path) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    let source_hash = hasher.finish();

    root.join(source_hash.to_string())
}

pub fn get_root_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("quizcast")
}

/// Get the path the uploaded copy of a video is stored at
pub fn get_upload_path(cache_dir: &Path, file_name: &str) -> PathBuf {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "bin".to_string());
    cache_dir.join(format!("video.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_is_stable_per_source() {
        let root = Path::new("/cache");
        let a = get_cache_dir_in(root, Path::new("/videos/a.mp4"));
        assert_eq!(a, get_cache_dir_in(root, Path::new("/videos/a.mp4")));
        assert_ne!(a, get_cache_dir_in(root, Path::new("/videos/b.mp4")));
        assert!(a.starts_with(root));
    }

    #[test]
    fn upload_path_keeps_extension() {
        let dir = Path::new("/cache/1");
        assert_eq!(get_upload_path(dir, "Intro.MKV"), dir.join("video.mkv"));
        assert_eq!(get_upload_path(dir, "raw"), dir.join("video.bin"));
    }
}
