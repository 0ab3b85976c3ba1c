use crate::collab::document::{language_by_tag, DocumentState};
use crate::collab::protocol::CollabMessage;
use crate::error::Result;

/// The local copy of a room's shared buffer. Local edits overwrite it,
/// remote changes overwrite it; whichever applied last wins, which is the
/// documented consistency policy for the sync channel.
#[derive(Debug)]
pub struct Workspace {
    document: DocumentState,
}

impl Workspace {
    /// Workspace seeded with the default language template
    pub fn new() -> Self {
        Self {
            document: DocumentState::default(),
        }
    }

    /// Workspace seeded with a specific language's template
    pub fn with_language(tag: &str) -> Result<Self> {
        let language = language_by_tag(tag)?;
        Ok(Self {
            document: DocumentState::for_language(language),
        })
    }

    pub fn code(&self) -> &str {
        &self.document.code
    }

    pub fn language_tag(&self) -> &str {
        &self.document.language_tag
    }

    pub fn document(&self) -> &DocumentState {
        &self.document
    }

    /// Local edit of the buffer
    pub fn set_code(&mut self, code: impl Into<String>) {
        self.document.code = code.into();
    }

    /// Switch language locally: the buffer resets to that language's
    /// default template and the reset must itself be published. Returns the
    /// new document state for publication.
    pub fn select_language(&mut self, tag: &str) -> Result<DocumentState> {
        let language = language_by_tag(tag)?;
        self.document = DocumentState::for_language(language);
        Ok(self.document.clone())
    }

    /// Seed from the document snapshot delivered at join time
    pub fn sync_snapshot(&mut self, document: DocumentState) {
        self.document = document;
    }

    /// Apply a change from a peer. Code and language tag land together so
    /// an observer never sees old code with a new language tag.
    pub fn apply_remote(&mut self, code: String, language_tag: String) {
        self.document.apply(code, language_tag);
    }

    /// The `codeChange` event carrying the current buffer
    pub fn change_message(&self, room_id: &str) -> CollabMessage {
        CollabMessage::CodeChange {
            room_id: room_id.to_string(),
            code: self.document.code.clone(),
            language_tag: self.document.language_tag.clone(),
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
