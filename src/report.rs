use std::io::{self, Write};

use crate::action::{Action, ActionDetail};
use crate::grammar::Grammar;
use crate::state::State;

/// State-by-state description of the machine: every configuration (or just
/// the basis), then the action on each lookahead.  Actions that lost a
/// precedence fight and unresolved conflicts are annotated rather than
/// hidden.
pub fn write_report<W: Write>(states: &[State], basis_only: bool, wtr: &mut W) -> io::Result<()> {
    for state in states {
        writeln!(wtr, "State {}:", state.ident())?;
        let configs = if basis_only {
            state.basis()
        } else {
            state.configs()
        };
        for config in configs {
            if config.is_reducible() {
                let tag = format!("({})", config.rule().ident());
                writeln!(wtr, "    {:>5} {}", tag, config)?;
            } else {
                writeln!(wtr, "          {}", config)?;
            }
        }
        writeln!(wtr)?;
        for action in state.actions().iter() {
            if let Some(description) = describe_action(action) {
                writeln!(wtr, "{:>30} {}", action.lookahead().name(), description)?;
            }
        }
        writeln!(wtr)?;
    }
    Ok(())
}

fn describe_action(action: &Action) -> Option<String> {
    match action.detail() {
        ActionDetail::Shift(target) => Some(format!("shift  {}", target)),
        ActionDetail::Accept => Some("accept".to_string()),
        ActionDetail::Reduce(rule) => Some(format!("reduce {}", rule.ident())),
        ActionDetail::Error => Some("error".to_string()),
        ActionDetail::Conflict(rule) => {
            Some(format!("reduce {}  ** Parsing conflict **", rule.ident()))
        }
        ActionDetail::ShiftResolved(target) => {
            Some(format!("shift  {}  -- dropped by precedence", target))
        }
        ActionDetail::ReduceResolved(rule) => {
            Some(format!("reduce {}  -- dropped by precedence", rule.ident()))
        }
        ActionDetail::NotUsed => None,
    }
}

/// One-paragraph summary for the `-s` option.
pub fn write_stats<W: Write>(
    grammar: &Grammar,
    states: &[State],
    table_entries: usize,
    conflicts: u32,
    wtr: &mut W,
) -> io::Result<()> {
    writeln!(
        wtr,
        "Parser statistics: {} terminals, {} nonterminals, {} rules",
        grammar.n_terminals(),
        grammar.symbols.non_terminals().len(),
        grammar.n_rules(),
    )?;
    writeln!(
        wtr,
        "                   {} states, {} table entries, {} conflicts",
        states.len(),
        table_entries,
        conflicts,
    )?;
    Ok(())
}
