//! License family classification.
//!
//! Classification is a deliberately cheap heuristic: the text is normalized
//! and then checked against an ordered list of signature phrases. The first
//! rule that matches decides the family. There is no scoring and no fuzzy
//! matching.
//!
//! # Rule order
//!
//! Several license texts quote or reference other licenses, so the order of
//! the rules matters:
//!
//! - MPL 2.0 is tested before the GPL family, since its text mentions the GPL.
//! - LGPL and AGPL are tested before plain GPL, since their names contain it.
//! - BSD texts share an opening phrase and are split by the presence of the
//!   "neither the name of" endorsement clause.
//!
//! The lookup tables live in a [`LicenseCatalog`] built once and shared,
//! never mutated after construction.

mod files;

pub use files::{LicenseFile, LicenseSearch};

use std::collections::HashSet;
use std::fmt;

use regex::Regex;

/// A license family from the fixed catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LicenseFamily {
    Mit,
    Bsd3Clause,
    Bsd2ClauseFreeBsd,
    Apache20,
    Mpl20,
    Gpl20,
    Gpl30,
    Lgpl21,
    Lgpl30,
    Agpl30,
    Cddl10,
    Epl10,
    Unlicense,
}

impl LicenseFamily {
    pub const ALL: [LicenseFamily; 13] = [
        LicenseFamily::Mit,
        LicenseFamily::Bsd3Clause,
        LicenseFamily::Bsd2ClauseFreeBsd,
        LicenseFamily::Apache20,
        LicenseFamily::Mpl20,
        LicenseFamily::Gpl20,
        LicenseFamily::Gpl30,
        LicenseFamily::Lgpl21,
        LicenseFamily::Lgpl30,
        LicenseFamily::Agpl30,
        LicenseFamily::Cddl10,
        LicenseFamily::Epl10,
        LicenseFamily::Unlicense,
    ];

    /// SPDX-style identifier used in the export.
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseFamily::Mit => "MIT",
            LicenseFamily::Bsd3Clause => "BSD-3-Clause",
            LicenseFamily::Bsd2ClauseFreeBsd => "BSD-2-Clause-FreeBSD",
            LicenseFamily::Apache20 => "Apache-2.0",
            LicenseFamily::Mpl20 => "MPL-2.0",
            LicenseFamily::Gpl20 => "GPL-2.0-only",
            LicenseFamily::Gpl30 => "GPL-3.0-only",
            LicenseFamily::Lgpl21 => "LGPL-2.1-only",
            LicenseFamily::Lgpl30 => "LGPL-3.0-only",
            LicenseFamily::Agpl30 => "AGPL-3.0-only",
            LicenseFamily::Cddl10 => "CDDL-1.0",
            LicenseFamily::Epl10 => "EPL-1.0",
            LicenseFamily::Unlicense => "Unlicense",
        }
    }
}

impl fmt::Display for LicenseFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of looking for a repository's license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LicenseGuess {
    /// No license file in the listing.
    #[default]
    Missing,
    /// A license file exists but its text matched no rule.
    Unrecognized,
    Recognized(LicenseFamily),
}

impl LicenseGuess {
    pub fn family(&self) -> Option<LicenseFamily> {
        match self {
            LicenseGuess::Recognized(family) => Some(*family),
            _ => None,
        }
    }
}

/// How a rule turns a matched signature into a family.
enum Verdict {
    Family(LicenseFamily),
    /// Pick `present` if the clause appears in the text, `absent` otherwise.
    Clause {
        clause: &'static str,
        present: LicenseFamily,
        absent: LicenseFamily,
    },
}

struct Rule {
    /// Any of these phrases triggers the rule.
    signatures: &'static [&'static str],
    verdict: Verdict,
}

impl Rule {
    fn apply(&self, text: &str) -> Option<LicenseFamily> {
        if !self.signatures.iter().any(|s| text.contains(s)) {
            return None;
        }
        match &self.verdict {
            Verdict::Family(family) => Some(*family),
            Verdict::Clause {
                clause,
                present,
                absent,
            } => Some(if text.contains(clause) { *present } else { *absent }),
        }
    }
}

const FILE_STEMS: [&str; 5] = ["copying", "copyleft", "copyright", "license", "unlicense"];
const FILE_EXTENSIONS: [&str; 4] = ["", ".md", ".rst", ".txt"];

/// Frozen lookup tables for license detection.
pub struct LicenseCatalog {
    rules: Vec<Rule>,
    file_names: HashSet<String>,
    spaces: Regex,
}

impl LicenseCatalog {
    pub fn new() -> Self {
        let file_names = FILE_STEMS
            .iter()
            .flat_map(|stem| FILE_EXTENSIONS.iter().map(move |ext| format!("{stem}{ext}")))
            .collect();

        Self {
            rules: standard_rules(),
            file_names,
            spaces: Regex::new(r"\s{2,}").expect("static regex"),
        }
    }

    /// Lower-case the text, turn line breaks and tabs into spaces, strip
    /// commas and collapse runs of whitespace.
    pub fn normalize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.to_lowercase().chars() {
            match c {
                '\r' | '\n' | '\t' => out.push(' '),
                ',' => {}
                c => out.push(c),
            }
        }
        self.spaces.replace_all(&out, " ").into_owned()
    }

    /// Classify license text. `None` means no rule matched.
    pub fn classify(&self, text: &str) -> Option<LicenseFamily> {
        let text = self.normalize(text);
        self.rules.iter().find_map(|rule| rule.apply(&text))
    }

    /// Same as [`classify`](Self::classify) but folded into a [`LicenseGuess`].
    pub fn guess(&self, text: &str) -> LicenseGuess {
        match self.classify(text) {
            Some(family) => LicenseGuess::Recognized(family),
            None => LicenseGuess::Unrecognized,
        }
    }

    /// True if the base name of `path` is a well-known license file name.
    /// Both `/` and `\` are treated as separators.
    pub fn is_license_file(&self, path: &str) -> bool {
        let base = path.rsplit(&['/', '\\'][..]).next().unwrap_or(path);
        self.file_names.contains(&base.to_lowercase())
    }

    /// Sorted list of recognized license file names.
    pub fn file_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.file_names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for LicenseCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn standard_rules() -> Vec<Rule> {
    use LicenseFamily::*;

    vec![
        Rule {
            signatures: &[
                "permission is hereby granted free of charge to any person obtaining a copy of this software",
            ],
            verdict: Verdict::Family(Mit),
        },
        Rule {
            signatures: &[
                "apache license version 2.0 ",
                "http://www.apache.org/licenses/license-2.0",
            ],
            verdict: Verdict::Family(Apache20),
        },
        Rule {
            signatures: &["mozilla public license version 2.0 "],
            verdict: Verdict::Family(Mpl20),
        },
        Rule {
            signatures: &["gnu lesser general public license version 2.1 "],
            verdict: Verdict::Family(Lgpl21),
        },
        Rule {
            signatures: &["gnu lesser general public license version 3 "],
            verdict: Verdict::Family(Lgpl30),
        },
        Rule {
            signatures: &["gnu affero general public license version 3 "],
            verdict: Verdict::Family(Agpl30),
        },
        Rule {
            signatures: &["gnu general public license version 2 "],
            verdict: Verdict::Family(Gpl20),
        },
        Rule {
            signatures: &["gnu general public license version 3 "],
            verdict: Verdict::Family(Gpl30),
        },
        Rule {
            signatures: &["redistribution and use in source and binary forms"],
            verdict: Verdict::Clause {
                clause: "neither the name of",
                present: Bsd3Clause,
                absent: Bsd2ClauseFreeBsd,
            },
        },
        Rule {
            signatures: &["common development and distribution license (cddl) version 1.0 "],
            verdict: Verdict::Family(Cddl10),
        },
        Rule {
            signatures: &["eclipse public license - v 1.0 "],
            verdict: Verdict::Family(Epl10),
        },
        Rule {
            signatures: &["this is free and unencumbered software released into the public domain"],
            verdict: Verdict::Family(Unlicense),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reference_text(family: LicenseFamily) -> &'static str {
        match family {
            LicenseFamily::Mit => {
                "MIT License\n\nCopyright (c) 2017 Someone\n\nPermission is hereby granted, free of charge, to any person obtaining a copy\nof this software and associated documentation files"
            }
            LicenseFamily::Bsd3Clause => {
                "Copyright (c) 2015, Someone\nAll rights reserved.\n\nRedistribution and use in source and binary forms, with or without\nmodification, are permitted provided that the following conditions are met:\n\n* Neither the name of the copyright holder nor the names of its\n  contributors may be used to endorse or promote products"
            }
            LicenseFamily::Bsd2ClauseFreeBsd => {
                "Copyright (c) 2015, Someone\nAll rights reserved.\n\nRedistribution and use in source and binary forms, with or without\nmodification, are permitted provided that the following conditions are met:\n\n1. Redistributions of source code must retain the above copyright notice"
            }
            LicenseFamily::Apache20 => {
                "                                 Apache License\n                           Version 2.0, January 2004\n                        http://www.apache.org/licenses/"
            }
            LicenseFamily::Mpl20 => {
                "Mozilla Public License Version 2.0\n==================================\n\n1. Definitions"
            }
            LicenseFamily::Gpl20 => {
                "                    GNU GENERAL PUBLIC LICENSE\n                       Version 2, June 1991\n\n Copyright (C) 1989, 1991 Free Software Foundation, Inc."
            }
            LicenseFamily::Gpl30 => {
                "                    GNU GENERAL PUBLIC LICENSE\n                       Version 3, 29 June 2007\n\n Copyright (C) 2007 Free Software Foundation, Inc."
            }
            LicenseFamily::Lgpl21 => {
                "                  GNU LESSER GENERAL PUBLIC LICENSE\n                       Version 2.1, February 1999\n\n This library is free software"
            }
            LicenseFamily::Lgpl30 => {
                "                   GNU LESSER GENERAL PUBLIC LICENSE\n                       Version 3, 29 June 2007\n\n  This version of the GNU Lesser General Public License incorporates\nthe terms and conditions of version 3 of the GNU General Public\nLicense"
            }
            LicenseFamily::Agpl30 => {
                "                    GNU AFFERO GENERAL PUBLIC LICENSE\n                       Version 3, 19 November 2007\n\n Copyright (C) 2007 Free Software Foundation, Inc."
            }
            LicenseFamily::Cddl10 => {
                "COMMON DEVELOPMENT AND DISTRIBUTION LICENSE (CDDL)\nVersion 1.0\n\n1. Definitions."
            }
            LicenseFamily::Epl10 => {
                "Eclipse Public License - v 1.0\n\nTHE ACCOMPANYING PROGRAM IS PROVIDED UNDER THE TERMS OF THIS ECLIPSE PUBLIC LICENSE"
            }
            LicenseFamily::Unlicense => {
                "This is free and unencumbered software released into the public domain.\n\nAnyone is free to copy, modify, publish, use"
            }
        }
    }

    #[test]
    fn test_reference_texts_classify_to_their_family() {
        let catalog = LicenseCatalog::new();
        for family in LicenseFamily::ALL {
            assert_eq!(
                catalog.classify(reference_text(family)),
                Some(family),
                "reference text for {family}"
            );
        }
    }

    #[test]
    fn test_normalize() {
        let catalog = LicenseCatalog::new();
        assert_eq!(
            catalog.normalize("Hello,\r\nWorld\t\tFOO,  bar"),
            "hello world foo bar"
        );
        assert_eq!(catalog.normalize(""), "");
    }

    #[test]
    fn test_mpl_wins_over_gpl() {
        let catalog = LicenseCatalog::new();
        let text = "Mozilla Public License Version 2.0\n\
                    Secondary licenses: GNU General Public License, Version 2 or later\n\
                    GNU General Public License Version 3 applies too";
        assert_eq!(catalog.classify(text), Some(LicenseFamily::Mpl20));
    }

    #[test]
    fn test_lgpl_wins_over_gpl() {
        let catalog = LicenseCatalog::new();
        let text = "GNU LESSER GENERAL PUBLIC LICENSE Version 3, 29 June 2007\n\
                    refers to version 3 of the GNU General Public License version 3 text";
        assert_eq!(catalog.classify(text), Some(LicenseFamily::Lgpl30));
    }

    #[test]
    fn test_bsd_clause_split() {
        let catalog = LicenseCatalog::new();
        let opening = "Redistribution and use in source and binary forms, with or without modification";
        assert_eq!(
            catalog.classify(&format!("{opening}. Neither the name of the project")),
            Some(LicenseFamily::Bsd3Clause)
        );
        assert_eq!(
            catalog.classify(opening),
            Some(LicenseFamily::Bsd2ClauseFreeBsd)
        );
    }

    #[test]
    fn test_apache_url_alone() {
        let catalog = LicenseCatalog::new();
        let text = "Licensed under the terms at http://www.apache.org/licenses/LICENSE-2.0";
        assert_eq!(catalog.classify(text), Some(LicenseFamily::Apache20));
    }

    #[test]
    fn test_unrecognized_prose() {
        let catalog = LicenseCatalog::new();
        assert_eq!(catalog.classify("All rights reserved. Do not copy."), None);
        assert_eq!(catalog.classify(""), None);
        assert_eq!(
            catalog.guess("lorem ipsum dolor sit amet"),
            LicenseGuess::Unrecognized
        );
    }

    #[test]
    fn test_license_file_names() {
        let catalog = LicenseCatalog::new();
        assert!(catalog.is_license_file("LICENSE"));
        assert!(catalog.is_license_file("License.md"));
        assert!(catalog.is_license_file("docs/COPYING.txt"));
        assert!(catalog.is_license_file("UNLICENSE.rst"));
        assert!(!catalog.is_license_file("LICENSE.html"));
        assert!(!catalog.is_license_file("license/README"));
        assert!(!catalog.is_license_file("my-license"));
        assert_eq!(catalog.file_names().len(), 20);
    }

    #[test]
    fn test_family_identifiers_are_unique() {
        let ids: HashSet<&str> = LicenseFamily::ALL.iter().map(|f| f.as_str()).collect();
        assert_eq!(ids.len(), LicenseFamily::ALL.len());
    }

    proptest! {
        #[test]
        fn test_normalize_is_idempotent(text in "\\PC*") {
            let catalog = LicenseCatalog::new();
            let once = catalog.normalize(&text);
            prop_assert_eq!(catalog.normalize(&once), once.clone());
        }

        #[test]
        fn test_normalize_idempotent_on_whitespace(text in "[a-zA-Z ,\t\r\n]{0,64}") {
            let catalog = LicenseCatalog::new();
            let once = catalog.normalize(&text);
            prop_assert_eq!(catalog.normalize(&once), once.clone());
        }
    }
}
