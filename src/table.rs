use crate::action::{Action, ActionDetail};
use crate::grammar::Grammar;
use crate::rule::Rule;
use crate::state::State;

/// Integer code for an action, or None for the kinds that never reach the
/// table.  Shifts use the target state number directly; the other codes
/// are stacked above the state numbers.
pub fn action_code(detail: &ActionDetail, n_states: usize, n_rules: usize) -> Option<usize> {
    match detail {
        ActionDetail::Shift(target) => Some(*target as usize),
        ActionDetail::Reduce(rule) => Some(n_states + rule.ident() as usize),
        ActionDetail::Error => Some(n_states + n_rules),
        ActionDetail::Accept => Some(n_states + n_rules + 1),
        _ => None,
    }
}

/// Fold each state's most popular reduce into a single default action.
/// Only runs of two or more reduces by the same rule are worth a default;
/// the replaced actions stay in the list marked unused.
pub fn compress_tables(grammar: &Grammar, states: &[State]) {
    let default_mark = grammar.symbols.default_mark();
    for state in states {
        if state
            .actions()
            .iter()
            .any(|action| action.lookahead().is_default_mark())
        {
            continue;
        }
        let mut best: Option<Rule> = None;
        let mut best_count = 0usize;
        {
            let actions = state.actions();
            for action in actions.iter() {
                let rule = match action.detail() {
                    ActionDetail::Reduce(rule) => rule,
                    _ => continue,
                };
                if Some(rule) == best.as_ref() {
                    continue;
                }
                let count = actions
                    .iter()
                    .filter(|other| match other.detail() {
                        ActionDetail::Reduce(other_rule) => other_rule == rule,
                        _ => false,
                    })
                    .count();
                if count > best_count {
                    best_count = count;
                    best = Some(rule.clone());
                }
            }
        }
        if best_count < 2 {
            continue;
        }
        let rule = best.expect("counted at least twice");
        {
            let mut actions = state.actions_mut();
            for action in actions.iter_mut() {
                let replace = match action.detail() {
                    ActionDetail::Reduce(other_rule) => *other_rule == rule,
                    _ => false,
                };
                if replace {
                    action.set_detail(ActionDetail::NotUsed);
                }
            }
            actions.push(Action::reduce(default_mark.clone(), rule));
        }
        state.sort_actions();
    }
}

/// One slot of the emitted table: the lookahead code it answers to, the
/// action code, and the index of the next slot in the same hash chain.
#[derive(Debug, Clone)]
pub struct PackedSlot {
    pub lookahead: u32,
    pub action: usize,
    pub next: Option<usize>,
    pub comment: String,
}

/// The global action table plus each state's window into it.
#[derive(Debug, Default)]
pub struct PackedTable {
    pub slots: Vec<PackedSlot>,
    pub starts: Vec<usize>,
    pub masks: Vec<usize>,
    pub defaults: Vec<usize>,
}

impl PackedTable {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The lookup the generated driver performs, usable from tests.
    pub fn find(&self, state: usize, lookahead: u32) -> usize {
        let mut index = self.starts[state] + (lookahead as usize & self.masks[state]);
        loop {
            let slot = &self.slots[index];
            if slot.lookahead == lookahead {
                return slot.action;
            }
            match slot.next {
                Some(next) => index = next,
                None => return self.defaults[state],
            }
        }
    }
}

/// Pack every state's coded actions into an open-addressed hash table of
/// power-of-two size.  Each action hashes to `symbol & mask`; the head of
/// each bucket keeps its natural slot and the remaining entries are swept
/// into free slots, chained through their `next` indices.  The default
/// action is not hashed; it becomes the state's fallback.
pub fn pack_tables(grammar: &Grammar, states: &[State]) -> PackedTable {
    let n_states = states.len();
    let n_rules = grammar.n_rules();
    let error_code = n_states + n_rules;
    let no_code = grammar.n_symbols() as u32;
    let mut table = PackedTable::default();

    for state in states {
        let mut coded: Vec<(u32, usize, String)> = vec![];
        let mut default_code = error_code;
        {
            let actions = state.actions();
            for action in actions.iter() {
                let code = match action_code(action.detail(), n_states, n_rules) {
                    Some(code) => code,
                    None => continue,
                };
                if action.lookahead().is_default_mark() {
                    default_code = code;
                } else {
                    let comment = format!(
                        "State {:3}: {} {}",
                        state.ident(),
                        action.lookahead().name(),
                        describe_code(action.detail())
                    );
                    coded.push((action.lookahead().ident(), code, comment));
                }
            }
        }

        let n_action = coded.len();
        let table_size = n_action.next_power_of_two();
        let mask = table_size - 1;
        let mut buckets: Vec<Vec<usize>> = vec![vec![]; table_size];
        for (index, (lookahead, _, _)) in coded.iter().enumerate() {
            buckets[*lookahead as usize & mask].push(index);
        }

        // Bucket heads stay home; later arrivals are relocated into free
        // slots in sweep order, remembering where each one landed.
        let mut placed: Vec<Option<usize>> = vec![None; table_size];
        for (bucket_index, bucket) in buckets.iter().enumerate() {
            if let Some(&head) = bucket.first() {
                placed[bucket_index] = Some(head);
            }
        }
        let mut free: Vec<usize> = (0..table_size).filter(|i| placed[*i].is_none()).collect();
        free.reverse();
        let mut position: Vec<usize> = vec![0; n_action];
        for (bucket_index, bucket) in buckets.iter().enumerate() {
            for (chain_index, &entry) in bucket.iter().enumerate() {
                if chain_index == 0 {
                    position[entry] = bucket_index;
                } else {
                    let slot = free.pop().expect("table has room for every action");
                    placed[slot] = Some(entry);
                    position[entry] = slot;
                }
            }
        }

        let tab_start = table.slots.len();
        let mut next_of: Vec<Option<usize>> = vec![None; n_action];
        for bucket in buckets.iter() {
            for pair in bucket.windows(2) {
                next_of[pair[0]] = Some(tab_start + position[pair[1]]);
            }
        }

        for slot in 0..table_size {
            match placed[slot] {
                Some(entry) => table.slots.push(PackedSlot {
                    lookahead: coded[entry].0,
                    action: coded[entry].1,
                    next: next_of[entry],
                    comment: coded[entry].2.clone(),
                }),
                None => table.slots.push(PackedSlot {
                    lookahead: no_code,
                    action: error_code,
                    next: None,
                    comment: "Unused".to_string(),
                }),
            }
        }
        table.starts.push(tab_start);
        table.masks.push(mask);
        table.defaults.push(default_code);
    }
    table
}

fn describe_code(detail: &ActionDetail) -> String {
    match detail {
        ActionDetail::Shift(target) => format!("shift  {}", target),
        ActionDetail::Reduce(rule) => format!("reduce {}", rule.ident()),
        ActionDetail::Error => "error".to_string(),
        ActionDetail::Accept => "accept".to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::find_actions;
    use crate::scanner::parse_grammar;
    use crate::state::StateBuilder;

    fn analyze(text: &str) -> (Grammar, Vec<State>) {
        let mut grammar = Grammar::new("test.y");
        parse_grammar(text, &mut grammar);
        grammar.prepare();
        let states = StateBuilder::build(&grammar);
        find_actions(&grammar, &states);
        (grammar, states)
    }

    fn count_details<F: Fn(&ActionDetail) -> bool>(states: &[State], pred: F) -> usize {
        states
            .iter()
            .flat_map(|state| state.actions().clone())
            .filter(|action| pred(action.detail()))
            .count()
    }

    #[test]
    fn repeated_reduces_fold_into_a_default() {
        // After "a ::= A" the reduce appears on both B and end-of-input.
        let (grammar, states) = analyze("s ::= a B . s ::= a . a ::= A .");
        compress_tables(&grammar, &states);
        let defaults = count_details(&states, |d| matches!(d, ActionDetail::Reduce(_)));
        let unused = count_details(&states, |d| matches!(d, ActionDetail::NotUsed));
        assert!(unused >= 2);
        assert!(defaults >= 1);
        let default_states: Vec<&State> = states
            .iter()
            .filter(|state| {
                state
                    .actions()
                    .iter()
                    .any(|action| action.lookahead().is_default_mark())
            })
            .collect();
        assert!(!default_states.is_empty());
    }

    #[test]
    fn compression_is_idempotent() {
        let (grammar, states) = analyze("s ::= a B . s ::= a . a ::= A .");
        compress_tables(&grammar, &states);
        let snapshot: Vec<usize> = states.iter().map(|s| s.actions().len()).collect();
        compress_tables(&grammar, &states);
        let again: Vec<usize> = states.iter().map(|s| s.actions().len()).collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn packed_lookup_matches_actions() {
        let (grammar, states) = analyze("e ::= e PLUS t . e ::= t . t ::= NUM .");
        compress_tables(&grammar, &states);
        let table = pack_tables(&grammar, &states);
        let n_states = states.len();
        let n_rules = grammar.n_rules();
        for state in states.iter() {
            for action in state.actions().iter() {
                if action.lookahead().is_default_mark() {
                    continue;
                }
                if let Some(code) = action_code(action.detail(), n_states, n_rules) {
                    assert_eq!(
                        table.find(state.ident() as usize, action.lookahead().ident()),
                        code,
                        "state {} lookahead {}",
                        state.ident(),
                        action.lookahead().name()
                    );
                }
            }
        }
    }

    #[test]
    fn missing_lookahead_falls_to_default() {
        let (grammar, states) = analyze("s ::= A . s ::= B .");
        let table = pack_tables(&grammar, &states);
        let n_states = states.len();
        let n_rules = grammar.n_rules();
        // State 0 has no action on end-of-input.
        let end = grammar.symbols.end_symbol().ident();
        assert_eq!(table.find(0, end), n_states + n_rules);
    }

    #[test]
    fn default_state_hashes_no_reduce_entries() {
        let (grammar, states) = analyze("s ::= a B . s ::= a . a ::= A .");
        compress_tables(&grammar, &states);
        let table = pack_tables(&grammar, &states);
        for (index, state) in states.iter().enumerate() {
            let has_default = state
                .actions()
                .iter()
                .any(|action| action.lookahead().is_default_mark());
            if has_default {
                let n_states = states.len();
                let reduce_slots = (table.starts[index]
                    ..table
                        .starts
                        .get(index + 1)
                        .copied()
                        .unwrap_or_else(|| table.len()))
                    .filter(|i| {
                        let slot = &table.slots[*i];
                        slot.lookahead != grammar.n_symbols() as u32 && slot.action >= n_states
                    })
                    .count();
                assert_eq!(reduce_slots, 0);
                assert!(table.defaults[index] >= n_states);
            }
        }
    }
}
