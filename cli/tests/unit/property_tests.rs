//! Property-based tests for parsers and normalizers.

use dockhand_cli::application::services::task_runner::worker_count;
use dockhand_cli::domain::operation::{backup_name, is_backup_name};
use dockhand_cli::domain::ps::parse_ps_output;
use dockhand_cli::domain::shell::quote;
use proptest::prelude::*;

proptest! {
    /// Worker count never exceeds the request or the targets and is never 0.
    #[test]
    fn prop_worker_count_bounds(c in 0usize..200, t in 0usize..200) {
        let w = worker_count(c, t);
        prop_assert!(w >= 1);
        prop_assert!(w <= c.max(1));
        prop_assert!(w <= t.max(1));
    }

    /// Backup names are always recognisable and keep the original prefix.
    #[test]
    fn prop_backup_names_are_recognised(name in "[a-z][a-z0-9_-]{0,20}", ms in 0i64..i64::MAX, salt: u16) {
        let b = backup_name(&name, ms, salt);
        prop_assert!(is_backup_name(&b));
        let prefix = format!("{name}_backup_");
        prop_assert!(b.starts_with(&prefix));
    }

    /// A ps scan never loses lines: each is an entry or rejected.
    #[test]
    fn prop_ps_scan_accounts_for_every_line(lines in proptest::collection::vec("[a-f0-9]{12} [a-z]{1,8} Up [0-9] hours [a-z]{1,8}|[a-z ]{1,30}", 0..10)) {
        let text = lines.join("\n");
        let scan = parse_ps_output(&text);
        let meaningful = lines.iter().filter(|l| !l.trim().is_empty()).count();
        prop_assert_eq!(scan.entries.len() + scan.rejected.len(), meaningful);
    }

    /// Quoted arguments round-trip through POSIX single-quote rules.
    #[test]
    fn prop_quote_has_no_bare_single_quotes(arg in ".{0,40}") {
        let q = quote(&arg);
        if q.starts_with('\'') {
            prop_assert!(q.ends_with('\''));
            let inner = &q[1..q.len() - 1];
            prop_assert!(!inner.replace(r"'\''", "").contains('\''));
        }
    }
}
