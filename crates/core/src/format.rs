use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Document formats a template source may be prepared from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    /// Office Open XML word processing document.
    Docx,
    /// Office Open XML presentation.
    Pptx,
    /// OpenDocument text.
    Odt,
    /// OpenDocument presentation.
    Odp,
    /// Raw XML file.
    Xml,
    /// Plain text, like XML without a header.
    Txt,
}

impl TemplateFormat {
    pub const ALL: [TemplateFormat; 6] = [
        TemplateFormat::Docx,
        TemplateFormat::Pptx,
        TemplateFormat::Odt,
        TemplateFormat::Odp,
        TemplateFormat::Xml,
        TemplateFormat::Txt,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            TemplateFormat::Docx => "docx",
            TemplateFormat::Pptx => "pptx",
            TemplateFormat::Odt => "odt",
            TemplateFormat::Odp => "odp",
            TemplateFormat::Xml => "xml",
            TemplateFormat::Txt => "txt",
        }
    }

    /// Guess the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }
}

impl fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
