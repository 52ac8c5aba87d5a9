use std::cmp::Ordering;

use crate::grammar::Grammar;
use crate::rule::Rule;
use crate::state::State;
use crate::symbol::{Associativity, Symbol};

/// What a state does on one lookahead.  The resolved and unused variants
/// stay in the action list so the report can show what happened to them;
/// only the first four ever reach the packed table.
#[derive(Debug, Clone)]
pub enum ActionDetail {
    Shift(u32),
    Accept,
    Reduce(Rule),
    Error,
    Conflict(Rule),
    ShiftResolved(u32),
    ReduceResolved(Rule),
    NotUsed,
}

impl ActionDetail {
    fn rank(&self) -> u8 {
        match self {
            ActionDetail::Shift(_) => 0,
            ActionDetail::Accept => 1,
            ActionDetail::Reduce(_) => 2,
            ActionDetail::Error => 3,
            ActionDetail::Conflict(_) => 4,
            ActionDetail::ShiftResolved(_) => 5,
            ActionDetail::ReduceResolved(_) => 6,
            ActionDetail::NotUsed => 7,
        }
    }

    fn rule_ident(&self) -> u32 {
        match self {
            ActionDetail::Reduce(rule)
            | ActionDetail::Conflict(rule)
            | ActionDetail::ReduceResolved(rule) => rule.ident(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Action {
    lookahead: Symbol,
    detail: ActionDetail,
}

impl Action {
    pub fn shift(lookahead: Symbol, target: u32) -> Self {
        Action {
            lookahead,
            detail: ActionDetail::Shift(target),
        }
    }

    pub fn accept(lookahead: Symbol) -> Self {
        Action {
            lookahead,
            detail: ActionDetail::Accept,
        }
    }

    pub fn reduce(lookahead: Symbol, rule: Rule) -> Self {
        Action {
            lookahead,
            detail: ActionDetail::Reduce(rule),
        }
    }

    pub fn lookahead(&self) -> &Symbol {
        &self.lookahead
    }

    pub fn detail(&self) -> &ActionDetail {
        &self.detail
    }

    pub fn set_detail(&mut self, detail: ActionDetail) {
        self.detail = detail;
    }

    fn sort_key(&self) -> (u32, u8, u32) {
        (
            self.lookahead.ident(),
            self.detail.rank(),
            self.detail.rule_ident(),
        )
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Action {}

impl PartialOrd for Action {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Action {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Generate the reduce and accept actions, sort each state's action list
/// and resolve same-lookahead clashes.  Returns the number of conflicts
/// neither precedence nor associativity could settle.
pub fn find_actions(grammar: &Grammar, states: &[State]) -> u32 {
    for state in states {
        for config in state.configs() {
            if !config.is_reducible() {
                continue;
            }
            let follows: Vec<u32> = config.follow().iter().collect();
            for ident in follows {
                let lookahead = grammar.symbols.symbols()[ident as usize].clone();
                if config.rule().is_augmented() {
                    state.add_action(Action::accept(lookahead));
                } else {
                    state.add_action(Action::reduce(lookahead, config.rule().clone()));
                }
            }
        }
    }
    states[0].add_action(Action::accept(grammar.start_symbol()));

    let mut conflicts = 0u32;
    for state in states {
        state.sort_actions();
        conflicts += resolve_state(&mut state.actions_mut());
    }

    for state in states {
        for action in state.actions().iter() {
            if let ActionDetail::Reduce(rule) = action.detail() {
                rule.set_can_reduce();
            }
        }
    }
    for rule in grammar.rules.iter() {
        if !rule.is_augmented() && !rule.can_reduce() {
            grammar.error(rule.line(), "This rule can not be reduced");
        }
    }
    conflicts
}

/// Walk each run of same-lookahead actions pairwise.  Shifts sort ahead of
/// reduces, so a shift/reduce clash always arrives with the shift first.
fn resolve_state(actions: &mut Vec<Action>) -> u32 {
    let mut conflicts = 0u32;
    for x in 0..actions.len() {
        for y in x + 1..actions.len() {
            if actions[y].lookahead() != actions[x].lookahead() {
                break;
            }
            conflicts += resolve_pair(actions, x, y);
        }
    }
    conflicts
}

fn resolve_pair(actions: &mut [Action], x: usize, y: usize) -> u32 {
    use ActionDetail::*;
    let detail_x = actions[x].detail().clone();
    let detail_y = actions[y].detail().clone();
    match (detail_x, detail_y) {
        (Shift(target), Reduce(rule)) => {
            let shift_symbol = actions[x].lookahead().clone();
            let shift_precedence = shift_symbol.precedence();
            let rule_precedence = rule.precedence();
            if shift_precedence < 0 || rule_precedence < 0 {
                actions[y].set_detail(Conflict(rule));
                1
            } else if shift_precedence > rule_precedence {
                actions[y].set_detail(ReduceResolved(rule));
                0
            } else if shift_precedence < rule_precedence {
                actions[x].set_detail(ShiftResolved(target));
                0
            } else if shift_symbol.associativity() == Associativity::Right {
                actions[y].set_detail(ReduceResolved(rule));
                0
            } else if shift_symbol.associativity() == Associativity::Left {
                actions[x].set_detail(ShiftResolved(target));
                0
            } else {
                actions[y].set_detail(Conflict(rule));
                1
            }
        }
        (Reduce(rule_x), Reduce(rule_y)) => {
            let precedence_x = rule_x.precedence();
            let precedence_y = rule_y.precedence();
            if precedence_x < 0 || precedence_y < 0 || precedence_x == precedence_y {
                actions[y].set_detail(Conflict(rule_y));
                1
            } else if precedence_x > precedence_y {
                actions[y].set_detail(ReduceResolved(rule_y));
                0
            } else {
                actions[x].set_detail(ReduceResolved(rule_x));
                0
            }
        }
        // Shift against shift cannot happen; every other combination is
        // already settled or harmless (the accept alongside the start
        // symbol's shift in state 0).
        _ => 0,
    }
}
