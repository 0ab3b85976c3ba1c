use serde::{Deserialize, Serialize};

use crate::error::{CollabError, Result};

/// A supported language: its display tag, the file extension sent to the
/// executor, and the default buffer template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub tag: &'static str,
    pub extension: &'static str,
    pub template: &'static str,
}

/// Fixed language table. The tag is what travels in `codeChange` events,
/// the extension is what travels in `run` requests.
pub const LANGUAGES: &[Language] = &[
    Language {
        tag: "C",
        extension: "c",
        template: "#include<stdio.h>\n    \nint main(){\n    printf(\"Hello World!\");\n    return 0;\n}",
    },
    Language {
        tag: "C++",
        extension: "cpp",
        template: "#include<iostream>\n    \nusing namespace std;\n\nint main(){\n    cout<<\"Hello World\"<<endl;\n    return 0;\n}",
    },
    Language {
        tag: "Java",
        extension: "java",
        template: "// Class with the main function should be named \"HelloWorld\"\nclass HelloWorld{ \n\n    public static void main(String[] args){\n        System.out.println(\"Hello World!\");\n    }\n}",
    },
    Language {
        tag: "Python",
        extension: "py",
        template: "print(\"Hello World!\")",
    },
    Language {
        tag: "Javascript",
        extension: "js",
        template: "console.log(\"Hello World!\")",
    },
];

/// Look up a language by its display tag
pub fn language_by_tag(tag: &str) -> Result<&'static Language> {
    LANGUAGES
        .iter()
        .find(|l| l.tag == tag)
        .ok_or_else(|| CollabError::UnknownLanguage(tag.to_string()))
}

/// Look up a language by its executor file extension
pub fn language_by_extension(extension: &str) -> Result<&'static Language> {
    LANGUAGES
        .iter()
        .find(|l| l.extension == extension)
        .ok_or_else(|| CollabError::UnknownLanguage(extension.to_string()))
}

/// The shared code buffer of a room. One instance per room; any member may
/// overwrite it and the last write wins. Code and language tag always travel
/// and apply together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    pub code: String,
    pub language_tag: String,
}

impl DocumentState {
    /// Fresh document seeded with a language's default template
    pub fn for_language(language: &Language) -> Self {
        Self {
            code: language.template.to_string(),
            language_tag: language.tag.to_string(),
        }
    }

    /// Overwrite both fields atomically (last writer wins)
    pub fn apply(&mut self, code: String, language_tag: String) {
        self.code = code;
        self.language_tag = language_tag;
    }
}

impl Default for DocumentState {
    fn default() -> Self {
        Self::for_language(&LANGUAGES[0])
    }
}
