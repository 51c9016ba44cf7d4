//! Persistence transports for finished notes.
//!
//! The pipeline only needs `save(content, suggested_path)`. Which transport
//! carries the note (a direct file write into the vault, an
//! `obsidian://new` URI, or the clipboard) is chosen by the caller, and
//! [`save_with_fallback`] tries several in order.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dedup::{self, DedupResult};

/// Typed persistence failures. The UI shows [`SaveError::user_message`],
/// never the raw error string.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Note URI is {len} characters, limit is {max}")]
    UriTooLong { len: usize, max: usize },

    #[error("Clipboard access denied")]
    ClipboardDenied,

    #[error("No vault configured")]
    VaultNotConfigured,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SaveError {
    /// Stable code for the UI layer
    pub fn code(&self) -> &'static str {
        match self {
            SaveError::PermissionDenied(_) => "permission_denied",
            SaveError::UriTooLong { .. } => "uri_too_long",
            SaveError::ClipboardDenied => "clipboard_denied",
            SaveError::VaultNotConfigured => "vault_not_configured",
            SaveError::Io(_) => "io_error",
        }
    }

    /// Localized message keyed by [`SaveError::code`]. Unknown locales get
    /// English.
    pub fn user_message(&self, locale: &str) -> &'static str {
        let chinese = locale.to_ascii_lowercase().starts_with("zh");
        match (self.code(), chinese) {
            ("permission_denied", false) => "The vault folder is not writable. Grant access to the folder and try again.",
            ("permission_denied", true) => "无法写入笔记库文件夹。请授予文件夹访问权限后重试。",
            ("uri_too_long", false) => "This conversation is too long to send through a link. Try saving fewer messages or use the file or clipboard method.",
            ("uri_too_long", true) => "对话内容过长，无法通过链接发送。请减少保存的消息数量，或改用文件或剪贴板方式。",
            ("clipboard_denied", false) => "Clipboard access was denied. Allow clipboard access and try again.",
            ("clipboard_denied", true) => "剪贴板访问被拒绝。请允许访问剪贴板后重试。",
            ("vault_not_configured", false) => "No vault is configured. Choose a vault in the settings.",
            ("vault_not_configured", true) => "尚未配置笔记库。请在设置中选择笔记库。",
            (_, false) => "The note could not be saved.",
            (_, true) => "笔记保存失败。",
        }
    }
}

fn classify_io(error: std::io::Error, path: &Path) -> SaveError {
    if error.kind() == std::io::ErrorKind::PermissionDenied {
        SaveError::PermissionDenied(path.display().to_string())
    } else {
        SaveError::Io(error)
    }
}

/// How a note left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMethod {
    Filesystem,
    Uri,
    Clipboard,
}

impl SaveMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveMethod::Filesystem => "filesystem",
            SaveMethod::Uri => "uri",
            SaveMethod::Clipboard => "clipboard",
        }
    }
}

/// A successful save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedNote {
    pub method: SaveMethod,
    /// Vault-relative file name the note ended up under
    pub filename: String,
    /// Identical content was already on disk, nothing was written
    pub duplicate: bool,
}

/// Something that can persist a finished note
pub trait VaultTransport: Send + Sync {
    fn method(&self) -> SaveMethod;

    fn save(&self, content: &str, suggested_path: &str) -> Result<SavedNote, SaveError>;
}

/// Writes notes straight into the vault directory
pub struct FilesystemTransport {
    root: PathBuf,
}

impl FilesystemTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl VaultTransport for FilesystemTransport {
    fn method(&self) -> SaveMethod {
        SaveMethod::Filesystem
    }

    fn save(&self, content: &str, suggested_path: &str) -> Result<SavedNote, SaveError> {
        if !self.root.is_dir() {
            warn!("Vault directory {:?} does not exist", self.root);
            return Err(SaveError::VaultNotConfigured);
        }

        let hash = dedup::compute_hash(content);
        let mut relative = suggested_path.to_string();
        let mut target = self.root.join(&relative);

        let mut status = dedup::check_existing(&target, &hash).map_err(|e| classify_io(e, &target))?;
        if status == DedupResult::Conflict {
            // Different note under the same name: keep both
            relative = with_suffix(suggested_path, &dedup::short_hash(content));
            target = self.root.join(&relative);
            status = dedup::check_existing(&target, &hash).map_err(|e| classify_io(e, &target))?;
            debug!("Name taken, using {}", relative);
        }

        if status == DedupResult::Duplicate {
            info!("Note already saved as {}, skipping write", relative);
            return Ok(SavedNote {
                method: SaveMethod::Filesystem,
                filename: relative,
                duplicate: true,
            });
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| classify_io(e, parent))?;
        }
        std::fs::write(&target, content).map_err(|e| classify_io(e, &target))?;
        info!("Saved note to {:?}", target);

        Ok(SavedNote {
            method: SaveMethod::Filesystem,
            filename: relative,
            duplicate: false,
        })
    }
}

fn with_suffix(path: &str, suffix: &str) -> String {
    match path.strip_suffix(".md") {
        Some(stem) => format!("{} {}.md", stem, suffix),
        None => format!("{} {}", path, suffix),
    }
}

/// Callback that hands a URI or text to the platform
pub type Opener = Box<dyn Fn(&str) -> Result<(), SaveError> + Send + Sync>;

/// Sends notes through the `obsidian://new` URI scheme
pub struct UriTransport {
    vault: Option<String>,
    max_length: usize,
    opener: Opener,
}

impl UriTransport {
    pub fn new(vault: Option<String>, max_length: usize, opener: Opener) -> Self {
        Self {
            vault,
            max_length,
            opener,
        }
    }

    /// `obsidian://new?vault=…&file=…&content=…` for a note
    pub fn build_uri(&self, content: &str, suggested_path: &str) -> Result<String, SaveError> {
        let vault = self
            .vault
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or(SaveError::VaultNotConfigured)?;
        let file = suggested_path.strip_suffix(".md").unwrap_or(suggested_path);

        let uri = format!(
            "obsidian://new?vault={}&file={}&content={}",
            urlencoding::encode(vault),
            urlencoding::encode(file),
            urlencoding::encode(content)
        );
        if uri.len() > self.max_length {
            return Err(SaveError::UriTooLong {
                len: uri.len(),
                max: self.max_length,
            });
        }
        Ok(uri)
    }
}

impl VaultTransport for UriTransport {
    fn method(&self) -> SaveMethod {
        SaveMethod::Uri
    }

    fn save(&self, content: &str, suggested_path: &str) -> Result<SavedNote, SaveError> {
        let uri = self.build_uri(content, suggested_path)?;
        (self.opener)(&uri)?;
        info!("Opened note URI ({} chars)", uri.len());
        Ok(SavedNote {
            method: SaveMethod::Uri,
            filename: suggested_path.to_string(),
            duplicate: false,
        })
    }
}

/// Copies the note text to the clipboard
pub struct ClipboardTransport {
    writer: Opener,
}

impl ClipboardTransport {
    pub fn new(writer: Opener) -> Self {
        Self { writer }
    }
}

impl VaultTransport for ClipboardTransport {
    fn method(&self) -> SaveMethod {
        SaveMethod::Clipboard
    }

    fn save(&self, content: &str, suggested_path: &str) -> Result<SavedNote, SaveError> {
        (self.writer)(content)?;
        info!("Copied note to clipboard ({} bytes)", content.len());
        Ok(SavedNote {
            method: SaveMethod::Clipboard,
            filename: suggested_path.to_string(),
            duplicate: false,
        })
    }
}

/// Try each transport in order; the first success wins. With every
/// transport failing, the last error is returned.
pub fn save_with_fallback(
    transports: &[Box<dyn VaultTransport>],
    content: &str,
    suggested_path: &str,
) -> Result<SavedNote, SaveError> {
    let mut last_error = SaveError::VaultNotConfigured;
    for transport in transports {
        match transport.save(content, suggested_path) {
            Ok(saved) => return Ok(saved),
            Err(e) => {
                warn!("{} save failed ({}), trying next transport", transport.method().as_str(), e.code());
                last_error = e;
            }
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_opener() -> (Opener, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let opener: Opener = Box::new(move |value: &str| {
            sink.lock().unwrap().push(value.to_string());
            Ok(())
        });
        (opener, seen)
    }

    #[test]
    fn test_filesystem_writes_note() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FilesystemTransport::new(dir.path());

        let saved = transport.save("# Note", "AI Chats/2024-05-01 Test.md").unwrap();
        assert_eq!(saved.method, SaveMethod::Filesystem);
        assert_eq!(saved.filename, "AI Chats/2024-05-01 Test.md");
        assert!(!saved.duplicate);

        let written = std::fs::read_to_string(dir.path().join("AI Chats/2024-05-01 Test.md")).unwrap();
        assert_eq!(written, "# Note");
    }

    #[test]
    fn test_filesystem_skips_identical_note() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FilesystemTransport::new(dir.path());

        transport.save("# Note", "a.md").unwrap();
        let again = transport.save("# Note", "a.md").unwrap();
        assert!(again.duplicate);
        assert_eq!(again.filename, "a.md");
    }

    #[test]
    fn test_filesystem_conflict_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FilesystemTransport::new(dir.path());

        transport.save("# First", "a.md").unwrap();
        let second = transport.save("# Second", "a.md").unwrap();

        let expected = format!("a {}.md", dedup::short_hash("# Second"));
        assert_eq!(second.filename, expected);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.md")).unwrap(), "# First");
        assert_eq!(std::fs::read_to_string(dir.path().join(&expected)).unwrap(), "# Second");

        // Saving the second note again finds the suffixed copy
        assert!(transport.save("# Second", "a.md").unwrap().duplicate);
    }

    #[test]
    fn test_filesystem_missing_vault() {
        let transport = FilesystemTransport::new("/definitely/not/a/vault");
        let err = transport.save("x", "a.md").unwrap_err();
        assert_eq!(err.code(), "vault_not_configured");
    }

    #[test]
    fn test_uri_transport_builds_encoded_uri() {
        let (opener, seen) = recording_opener();
        let transport = UriTransport::new(Some("My Vault".to_string()), 8000, opener);

        let saved = transport.save("# Hi & bye", "AI Chats/2024-05-01 Test.md").unwrap();
        assert_eq!(saved.method, SaveMethod::Uri);
        assert_eq!(
            seen.lock().unwrap()[0],
            "obsidian://new?vault=My%20Vault&file=AI%20Chats%2F2024-05-01%20Test&content=%23%20Hi%20%26%20bye"
        );
    }

    #[test]
    fn test_uri_too_long() {
        let (opener, seen) = recording_opener();
        let transport = UriTransport::new(Some("v".to_string()), 50, opener);

        let err = transport.save(&"x".repeat(100), "a.md").unwrap_err();
        assert!(matches!(err, SaveError::UriTooLong { max: 50, .. }));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_uri_needs_vault_name() {
        let (opener, _) = recording_opener();
        let transport = UriTransport::new(None, 8000, opener);
        assert!(matches!(transport.save("x", "a.md"), Err(SaveError::VaultNotConfigured)));
    }

    #[test]
    fn test_fallback_to_clipboard() {
        let (clipboard, copied) = recording_opener();
        let failing: Opener = Box::new(|_: &str| Err(SaveError::ClipboardDenied));
        let transports: Vec<Box<dyn VaultTransport>> = vec![
            Box::new(UriTransport::new(Some("v".to_string()), 10, failing)),
            Box::new(ClipboardTransport::new(clipboard)),
        ];

        let saved = save_with_fallback(&transports, "# Note", "a.md").unwrap();
        assert_eq!(saved.method, SaveMethod::Clipboard);
        assert_eq!(copied.lock().unwrap().as_slice(), ["# Note".to_string()]);
    }

    #[test]
    fn test_fallback_returns_last_error() {
        let denied: Opener = Box::new(|_: &str| Err(SaveError::ClipboardDenied));
        let transports: Vec<Box<dyn VaultTransport>> = vec![Box::new(ClipboardTransport::new(denied))];
        let err = save_with_fallback(&transports, "x", "a.md").unwrap_err();
        assert_eq!(err.code(), "clipboard_denied");

        let err = save_with_fallback(&[], "x", "a.md").unwrap_err();
        assert_eq!(err.code(), "vault_not_configured");
    }

    #[test]
    fn test_localized_messages() {
        let err = SaveError::UriTooLong { len: 9000, max: 8000 };
        assert!(err.user_message("en-US").contains("too long"));
        assert!(err.user_message("zh-CN").contains("过长"));
        assert_eq!(
            SaveError::ClipboardDenied.user_message("fr"),
            SaveError::ClipboardDenied.user_message("en")
        );
    }
}
