//! Prompt text per pass.

use crate::request::{CandidatePayload, OracleRequest, PassKind};
use std::fmt::Write;

const CONSOLIDATE_RULES: &str = "\
You are consolidating person names extracted from email threads.

Rules:
1. Use the last-name hints below. If a single-word name matches exactly one
   full name's last name, map it to that full name.
2. First names on their own (\"Jeff\", \"Bill\", ...) map to \"None\". Do not guess.
3. If a single-word name matches several full names, leave it alone or map it
   to \"None\" when it is ambiguous.
4. Group obvious variants of the same person under one full name
   (\"President Clinton\" and \"Bill Clinton\" become \"Bill Clinton\").
5. Map garbage, email fragments and organisation names to \"None\".";

const CONSOLIDATE_FORMAT: &str = "\
Return ONLY a JSON object mapping each canonical name to its variants:
{\"Full Name\": [\"variant 1\", \"variant 2\"], \"None\": [\"garbage\", \"first name\"]}";

const REFINE_RULES: &str = "\
These canonical names survived a first consolidation pass. Find the remaining
duplicates:
- reversed names (\"Thomas Jr. Landon\" vs \"Landon Thomas\")
- with or without middle initials or titles
- nicknames (\"Bill Gates\" vs \"William Gates\")
- partial names (\"Maxwell\" vs \"Ghislaine Maxwell\")
Only merge when you are confident it is the same person; prefer the most
complete name. Map anything that is not a real person to \"None\".";

const TOKEN_OVERLAP_RULES: &str = "\
Each group below holds names sharing two or more name tokens. They may be the
same person written in a different order. For each group that is one person,
pick the best canonical form: \"First Last\" over \"Last First\", full over
partial, keep Jr./Sr./III. Do not merge different people.";

const SUFFIX_RULES: &str = "\
Each group below holds names that differ only by a suffix (Jr., Sr., III,
...) or punctuation. If a group is one person, merge to the more complete
name. If they are different people (for example father and son), leave them.";

const RENAME_FORMAT: &str = "\
Return ONLY a JSON object mapping each name that must change to its new
canonical name, for example {\"Old Name\": \"New Name\"}. Omit names that stay
the same. Return {} if nothing changes.";

pub fn render_prompt(request: &OracleRequest) -> String {
    let mut out = String::new();
    let rules = match request.pass {
        PassKind::Consolidate => CONSOLIDATE_RULES,
        PassKind::Refine => REFINE_RULES,
        PassKind::TokenOverlap => TOKEN_OVERLAP_RULES,
        PassKind::Suffix => SUFFIX_RULES,
    };
    out.push_str(rules);
    out.push_str("\n\n");

    match &request.payload {
        CandidatePayload::Names {
            names,
            last_name_hints,
        } => {
            if request.pass == PassKind::Consolidate {
                out.push_str("LAST-NAME HINTS (partial name -> possible full names):\n");
                if last_name_hints.is_empty() {
                    out.push_str("  (none found)\n");
                }
                for (partial, full) in last_name_hints {
                    let _ = writeln!(out, "  {partial} -> {}", full.join(", "));
                }
                out.push('\n');
            }
            out.push_str("NAMES:\n");
            let listed = serde_json::to_string_pretty(names).unwrap_or_else(|_| names.join("\n"));
            out.push_str(&listed);
            out.push('\n');
        }
        CandidatePayload::Groups { groups } => {
            out.push_str("CANDIDATE GROUPS:\n");
            for (i, group) in groups.iter().enumerate() {
                let _ = writeln!(out, "\nGroup {}:", i + 1);
                for name in group {
                    let _ = writeln!(out, "  - {name}");
                }
            }
        }
    }

    out.push('\n');
    out.push_str(match request.pass {
        PassKind::Consolidate => CONSOLIDATE_FORMAT,
        _ => RENAME_FORMAT,
    });
    out
}
