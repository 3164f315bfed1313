//! Static language table and the extension based detector.

use std::collections::HashMap;

use super::LanguageDetector;

/// How much of a file is inspected when looking for NUL bytes.
const BINARY_SNIFF_LEN: usize = 8000;

pub(crate) struct LanguageDef {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub filenames: &'static [&'static str],
    pub interpreters: &'static [&'static str],
    pub line_comments: &'static [&'static str],
    pub block_comments: &'static [(&'static str, &'static str)],
}

const C_BLOCK: &[(&str, &str)] = &[("/*", "*/")];
const XML_BLOCK: &[(&str, &str)] = &[("<!--", "-->")];

pub(crate) const LANGUAGES: &[LanguageDef] = &[
    LanguageDef {
        name: "C",
        extensions: &["c", "h"],
        filenames: &[],
        interpreters: &[],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "C#",
        extensions: &["cs"],
        filenames: &[],
        interpreters: &[],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "C++",
        extensions: &["cc", "cpp", "cxx", "hh", "hpp", "hxx"],
        filenames: &[],
        interpreters: &[],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "CSS",
        extensions: &["css"],
        filenames: &[],
        interpreters: &[],
        line_comments: &[],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "Dockerfile",
        extensions: &["dockerfile"],
        filenames: &["Dockerfile"],
        interpreters: &[],
        line_comments: &["#"],
        block_comments: &[],
    },
    LanguageDef {
        name: "Go",
        extensions: &["go"],
        filenames: &[],
        interpreters: &[],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "HTML",
        extensions: &["htm", "html"],
        filenames: &[],
        interpreters: &[],
        line_comments: &[],
        block_comments: XML_BLOCK,
    },
    LanguageDef {
        name: "Haskell",
        extensions: &["hs"],
        filenames: &[],
        interpreters: &["runhaskell"],
        line_comments: &["--"],
        block_comments: &[("{-", "-}")],
    },
    LanguageDef {
        name: "JSON",
        extensions: &["json"],
        filenames: &[],
        interpreters: &[],
        line_comments: &[],
        block_comments: &[],
    },
    LanguageDef {
        name: "Java",
        extensions: &["java"],
        filenames: &[],
        interpreters: &[],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "JavaScript",
        extensions: &["cjs", "js", "jsx", "mjs"],
        filenames: &[],
        interpreters: &["node", "nodejs"],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "Kotlin",
        extensions: &["kt", "kts"],
        filenames: &[],
        interpreters: &[],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "Lua",
        extensions: &["lua"],
        filenames: &[],
        interpreters: &["lua"],
        line_comments: &["--"],
        block_comments: &[("--[[", "]]")],
    },
    LanguageDef {
        name: "Makefile",
        extensions: &["mk", "mak"],
        filenames: &["GNUmakefile", "Makefile", "makefile"],
        interpreters: &["make"],
        line_comments: &["#"],
        block_comments: &[],
    },
    LanguageDef {
        name: "Markdown",
        extensions: &["markdown", "md"],
        filenames: &[],
        interpreters: &[],
        line_comments: &[],
        block_comments: &[],
    },
    LanguageDef {
        name: "PHP",
        extensions: &["php"],
        filenames: &[],
        interpreters: &["php"],
        line_comments: &["//", "#"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "Perl",
        extensions: &["pl", "pm"],
        filenames: &[],
        interpreters: &["perl"],
        line_comments: &["#"],
        block_comments: &[("=pod", "=cut")],
    },
    LanguageDef {
        name: "Python",
        extensions: &["py", "pyw"],
        filenames: &[],
        interpreters: &["python", "python2", "python3"],
        line_comments: &["#"],
        block_comments: &[],
    },
    LanguageDef {
        name: "Ruby",
        extensions: &["rb"],
        filenames: &["Gemfile", "Rakefile"],
        interpreters: &["ruby"],
        line_comments: &["#"],
        block_comments: &[("=begin", "=end")],
    },
    LanguageDef {
        name: "Rust",
        extensions: &["rs"],
        filenames: &[],
        interpreters: &[],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "SQL",
        extensions: &["sql"],
        filenames: &[],
        interpreters: &[],
        line_comments: &["--"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "Scala",
        extensions: &["scala", "sc"],
        filenames: &[],
        interpreters: &["scala"],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "Shell",
        extensions: &["bash", "sh", "zsh"],
        filenames: &[],
        interpreters: &["bash", "sh", "zsh"],
        line_comments: &["#"],
        block_comments: &[],
    },
    LanguageDef {
        name: "Swift",
        extensions: &["swift"],
        filenames: &[],
        interpreters: &[],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "TOML",
        extensions: &["toml"],
        filenames: &["Cargo.lock"],
        interpreters: &[],
        line_comments: &["#"],
        block_comments: &[],
    },
    LanguageDef {
        name: "TypeScript",
        extensions: &["ts", "tsx"],
        filenames: &[],
        interpreters: &["deno", "ts-node"],
        line_comments: &["//"],
        block_comments: C_BLOCK,
    },
    LanguageDef {
        name: "XML",
        extensions: &["xml", "xsd", "xsl"],
        filenames: &[],
        interpreters: &[],
        line_comments: &[],
        block_comments: XML_BLOCK,
    },
    LanguageDef {
        name: "YAML",
        extensions: &["yaml", "yml"],
        filenames: &[],
        interpreters: &[],
        line_comments: &["#"],
        block_comments: &[],
    },
];

/// Detects languages from file names, extensions and `#!` lines.
pub struct ExtensionDetector {
    by_filename: HashMap<&'static str, &'static LanguageDef>,
    by_extension: HashMap<&'static str, &'static LanguageDef>,
    by_interpreter: HashMap<&'static str, &'static LanguageDef>,
}

impl ExtensionDetector {
    pub fn new() -> Self {
        let mut by_filename = HashMap::new();
        let mut by_extension = HashMap::new();
        let mut by_interpreter = HashMap::new();
        for def in LANGUAGES {
            for name in def.filenames {
                by_filename.insert(*name, def);
            }
            for ext in def.extensions {
                by_extension.insert(*ext, def);
            }
            for interp in def.interpreters {
                by_interpreter.insert(*interp, def);
            }
        }
        Self {
            by_filename,
            by_extension,
            by_interpreter,
        }
    }

    /// Look up a language by name and, for extensionless files, shebang.
    pub(crate) fn definition(&self, path: &str, content: &[u8]) -> Option<&'static LanguageDef> {
        let base = path.rsplit('/').next().unwrap_or(path);
        if let Some(def) = self.by_filename.get(base).copied() {
            return Some(def);
        }

        if let Some((stem, ext)) = base.rsplit_once('.') {
            if !stem.is_empty() {
                return self.by_extension.get(ext.to_lowercase().as_str()).copied();
            }
        }

        self.from_shebang(content)
    }

    fn from_shebang(&self, content: &[u8]) -> Option<&'static LanguageDef> {
        let first = content.split(|b| *b == b'\n').next()?;
        let line = std::str::from_utf8(first).ok()?.strip_prefix("#!")?;
        let mut parts = line.split_whitespace();
        let program = parts.next()?.rsplit('/').next()?;
        let interpreter = if program == "env" {
            parts.find(|p| !p.starts_with('-'))?
        } else {
            program
        };
        self.by_interpreter.get(interpreter).copied()
    }
}

/// Content with a NUL byte near the start is treated as binary.
pub(crate) fn is_binary(content: &[u8]) -> bool {
    content[..content.len().min(BINARY_SNIFF_LEN)].contains(&0)
}

impl Default for ExtensionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageDetector for ExtensionDetector {
    fn detect(&self, path: &str, content: &[u8]) -> Option<String> {
        if is_binary(content) {
            return None;
        }
        self.definition(path, content)
            .map(|def| def.name.to_string())
    }
}
