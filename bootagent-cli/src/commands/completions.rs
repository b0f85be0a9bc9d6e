//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io;

use crate::Cli;

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd
        .get_name()
        .to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(shell: Shell) -> String {
        let mut buf = Vec::new();
        let mut cmd = Cli::command();
        let name = cmd
            .get_name()
            .to_string();
        generate(shell, &mut cmd, name, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_completions_bash_names_subcommands() {
        let output = script(Shell::Bash);
        assert!(output.contains("bootagent"));
        assert!(output.contains("serve"));
        assert!(output.contains("list-ports"));
    }

    #[test]
    fn test_completions_zsh_generates_output() {
        assert!(script(Shell::Zsh).contains("bootagent"));
    }

    #[test]
    fn test_completions_fish_generates_output() {
        assert!(!script(Shell::Fish).is_empty());
    }
}
