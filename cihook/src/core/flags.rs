//! Control flags carried in commit messages.
//!
//! Any whitespace-delimited token starting with `--` is a flag. Flags are
//! case-folded and kept in order of first appearance. Unknown flags are not an
//! error: they are ignored by the runner but still handed to the pipeline.

pub const CLEAN: &str = "clean";
pub const CLEAN_BRANCH: &str = "cleanbranch";
pub const CLEAN_PROJECT: &str = "cleanproject";
pub const NO_HOOK: &str = "nohook";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlFlags(Vec<String>);

impl ControlFlags {
    pub fn parse(message: &str) -> Self {
        let mut flags: Vec<String> = Vec::new();
        for token in message.split_whitespace() {
            let Some(name) = token.strip_prefix("--") else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let name = name.to_lowercase();
            if !flags.contains(&name) {
                flags.push(name);
            }
        }
        Self(flags)
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.0.iter().any(|f| f == flag)
    }

    pub fn clean_project(&self) -> bool {
        self.contains(CLEAN_PROJECT)
    }

    /// `--clean` is shorthand for `--cleanbranch`.
    pub fn clean_branch(&self) -> bool {
        self.contains(CLEAN_BRANCH) || self.contains(CLEAN)
    }

    pub fn no_hook(&self) -> bool {
        self.contains(NO_HOOK)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_dash_dash_tokens_lowercased() {
        let flags = ControlFlags::parse("deploy --CleanBranch now --NoHook");
        assert_eq!(flags.as_slice(), ["cleanbranch", "nohook"]);
        assert!(flags.clean_branch());
        assert!(flags.no_hook());
        assert!(!flags.clean_project());
    }

    #[test]
    fn plain_words_and_single_dash_are_ignored() {
        let flags = ControlFlags::parse("fix -clean typo in --");
        assert!(flags.as_slice().is_empty());
    }

    #[test]
    fn clean_alias_triggers_branch_clean() {
        assert!(ControlFlags::parse("--clean").clean_branch());
    }

    #[test]
    fn unknown_flags_are_kept_but_inert() {
        let flags = ControlFlags::parse("--verbose --cleanproject");
        assert_eq!(flags.as_slice(), ["verbose", "cleanproject"]);
        assert!(flags.clean_project());
        assert!(!flags.clean_branch());
    }

    #[test]
    fn duplicates_are_collapsed() {
        let flags = ControlFlags::parse("--clean\n--CLEAN\t--clean");
        assert_eq!(flags.as_slice(), ["clean"]);
    }
}
