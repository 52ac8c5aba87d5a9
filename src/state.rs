use std::{
    cell::{Cell, Ref, RefCell, RefMut},
    collections::HashMap,
    fmt,
    rc::Rc,
};

use crate::action::Action;
use crate::grammar::Grammar;
use crate::rule::Rule;
use crate::symbol::{set::TerminalSet, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStatus {
    Complete,
    Incomplete,
}

pub struct ConfigData {
    rule: Rule,
    dot: usize,
    follow: RefCell<TerminalSet>,
    forward: RefCell<Vec<Config>>,
    backward: RefCell<Vec<Config>>,
    state: Cell<u32>,
    status: Cell<ConfigStatus>,
}

/// A dotted rule plus the follow set being accumulated for it, wired into
/// the propagation-link graph.  Identity within one state under
/// construction is the (rule, dot) pair.
#[derive(Clone)]
pub struct Config(Rc<ConfigData>);

// The propagation links run both ways, so the derived form would loop.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Config({})", self)
    }
}

impl Config {
    fn new(rule: Rule, dot: usize) -> Self {
        Config(Rc::new(ConfigData {
            rule,
            dot,
            follow: RefCell::new(TerminalSet::new()),
            forward: RefCell::new(vec![]),
            backward: RefCell::new(vec![]),
            state: Cell::new(0),
            status: Cell::new(ConfigStatus::Incomplete),
        }))
    }

    pub fn rule(&self) -> &Rule {
        &self.0.rule
    }

    pub fn dot(&self) -> usize {
        self.0.dot
    }

    pub fn key(&self) -> (u32, usize) {
        (self.0.rule.ident(), self.0.dot)
    }

    pub fn next_symbol(&self) -> Option<Symbol> {
        self.0.rule.rhs_symbol(self.0.dot).cloned()
    }

    /// Dot at the end of the right-hand side.
    pub fn is_reducible(&self) -> bool {
        self.0.dot >= self.0.rule.len()
    }

    pub fn follow(&self) -> Ref<'_, TerminalSet> {
        self.0.follow.borrow()
    }

    pub fn add_follow(&self, ident: u32) -> bool {
        self.0.follow.borrow_mut().insert(ident)
    }

    pub fn union_follow_with(&self, set: &TerminalSet) -> bool {
        self.0.follow.borrow_mut().union_with(set)
    }

    /// Union another configuration's follow set into this one.  A self-edge
    /// is a no-op.
    pub fn union_follow_from(&self, other: &Config) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return false;
        }
        self.0.follow.borrow_mut().union_with(&other.0.follow.borrow())
    }

    pub fn add_forward(&self, target: &Config) {
        self.0.forward.borrow_mut().push(target.clone())
    }

    pub fn forward(&self) -> Vec<Config> {
        self.0.forward.borrow().clone()
    }

    pub fn add_backward(&self, source: &Config) {
        self.0.backward.borrow_mut().push(source.clone())
    }

    pub fn take_backward(&self) -> Vec<Config> {
        std::mem::take(&mut *self.0.backward.borrow_mut())
    }

    pub fn state(&self) -> u32 {
        self.0.state.get()
    }

    pub fn set_state(&self, state: u32) {
        self.0.state.set(state)
    }

    pub fn status(&self) -> ConfigStatus {
        self.0.status.get()
    }

    pub fn set_status(&self, status: ConfigStatus) {
        self.0.status.set(status)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut string = format!("{} ::=", self.0.rule.lhs().name());
        for (index, symbol) in self.0.rule.rhs().iter().enumerate() {
            if index == self.0.dot {
                string += " *";
            }
            string += &format!(" {}", symbol);
        }
        if self.0.dot >= self.0.rule.len() {
            string += " *";
        }
        write!(f, "{}", string)
    }
}

/// Interning pool for the configurations of the single state currently
/// being built.  Basis configurations are additionally collected so the
/// state's identity key can be computed.
#[derive(Default)]
pub struct ConfigPool {
    map: HashMap<(u32, usize), Config>,
    list: Vec<Config>,
    basis: Vec<Config>,
}

impl ConfigPool {
    pub fn new() -> Self {
        ConfigPool::default()
    }

    fn intern(&mut self, rule: &Rule, dot: usize, basis: bool) -> Config {
        let key = (rule.ident(), dot);
        if let Some(config) = self.map.get(&key) {
            config.clone()
        } else {
            let config = Config::new(rule.clone(), dot);
            self.map.insert(key, config.clone());
            self.list.push(config.clone());
            if basis {
                self.basis.push(config.clone());
            }
            config
        }
    }

    pub fn add(&mut self, rule: &Rule, dot: usize) -> Config {
        self.intern(rule, dot, false)
    }

    pub fn add_basis(&mut self, rule: &Rule, dot: usize) -> Config {
        self.intern(rule, dot, true)
    }

    fn sort_basis(&mut self) {
        self.basis.sort_by_key(|config| config.key());
    }

    fn sort_list(&mut self) {
        self.list.sort_by_key(|config| config.key());
    }

    fn basis_key(&self) -> Vec<(u32, usize)> {
        self.basis.iter().map(|config| config.key()).collect()
    }
}

pub struct StateData {
    ident: u32,
    basis: Vec<Config>,
    configs: Vec<Config>,
    actions: RefCell<Vec<Action>>,
}

/// One state of the machine: its sorted basis, the full closure, and the
/// action list filled in by the later passes.
#[derive(Clone)]
pub struct State(Rc<StateData>);

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State#{}({:?})", self.ident(), self.basis().iter().map(|c| c.key()).collect::<Vec<_>>())
    }
}

impl State {
    fn new(ident: u32, basis: Vec<Config>, configs: Vec<Config>) -> Self {
        State(Rc::new(StateData {
            ident,
            basis,
            configs,
            actions: RefCell::new(vec![]),
        }))
    }

    pub fn ident(&self) -> u32 {
        self.0.ident
    }

    pub fn basis(&self) -> &[Config] {
        &self.0.basis
    }

    pub fn configs(&self) -> &[Config] {
        &self.0.configs
    }

    pub fn actions(&self) -> Ref<'_, Vec<Action>> {
        self.0.actions.borrow()
    }

    pub fn actions_mut(&self) -> RefMut<'_, Vec<Action>> {
        self.0.actions.borrow_mut()
    }

    pub fn add_action(&self, action: Action) {
        self.0.actions.borrow_mut().push(action)
    }

    pub fn sort_actions(&self) {
        self.0.actions.borrow_mut().sort();
    }
}

/// Builds the LR(0) machine for a prepared grammar, then runs the
/// follow-set fixed point over the propagation links.
pub struct StateBuilder {
    states: Vec<State>,
    index: HashMap<Vec<(u32, usize)>, u32>,
}

impl StateBuilder {
    pub fn build(grammar: &Grammar) -> Vec<State> {
        let mut builder = StateBuilder {
            states: vec![],
            index: HashMap::new(),
        };
        let mut pool = ConfigPool::new();
        let wrapper = grammar.augmented_rule();
        let start_config = pool.add_basis(&wrapper, 0);
        start_config.add_follow(grammar.symbols.end_symbol().ident());
        builder.get_state(pool);
        builder.find_links();
        builder.find_follow_sets();
        builder.states
    }

    /// Return the state with the given basis, building it (and recursively
    /// its successors) when it is new.  When an equivalent state already
    /// exists the pending basis is discarded after its backward links have
    /// been transferred onto the existing configurations, pairwise: both
    /// basis lists are sorted on the same key, so they line up.
    fn get_state(&mut self, mut pool: ConfigPool) -> u32 {
        pool.sort_basis();
        let key = pool.basis_key();
        if let Some(&ident) = self.index.get(&key) {
            let existing = self.states[ident as usize].clone();
            for (old, pending) in existing.basis().iter().zip(pool.basis.iter()) {
                debug_assert_eq!(old.key(), pending.key());
                for source in pending.take_backward() {
                    old.add_backward(&source);
                }
            }
            ident
        } else {
            self.closure(&mut pool);
            pool.sort_list();
            let ident = self.states.len() as u32;
            let state = State::new(ident, pool.basis.clone(), pool.list.clone());
            for config in state.configs() {
                config.set_state(ident);
            }
            self.states.push(state.clone());
            self.index.insert(key, ident);
            self.build_shifts(&state);
            ident
        }
    }

    /// Expand the pool to its closure.  Each new configuration's follow set
    /// is seeded from the symbols after the expanded nonterminal; when that
    /// scan runs off the end of the rule, the outer configuration's follow
    /// must flow into the new one on every change, recorded as a forward
    /// propagation link.
    fn closure(&self, pool: &mut ConfigPool) {
        let mut i = 0;
        while i < pool.list.len() {
            let config = pool.list[i].clone();
            i += 1;
            let symbol = match config.next_symbol() {
                Some(symbol) => symbol,
                None => continue,
            };
            if !symbol.is_non_terminal() {
                continue;
            }
            for rule in symbol.rules() {
                let new_config = pool.add(&rule, 0);
                let mut fell_off = true;
                for follower in config.rule().rhs()[config.dot() + 1..].iter() {
                    if follower.is_terminal() {
                        new_config.add_follow(follower.ident());
                        fell_off = false;
                        break;
                    }
                    new_config.union_follow_with(&follower.firsts());
                    if !follower.lambda() {
                        fell_off = false;
                        break;
                    }
                }
                if fell_off {
                    config.add_forward(&new_config);
                }
            }
        }
    }

    /// Group the configurations by the symbol after the dot and build the
    /// successor state for each group.  Every advanced configuration keeps
    /// a backward link to the configuration it was advanced from.
    fn build_shifts(&mut self, state: &State) {
        for config in state.configs() {
            config.set_status(ConfigStatus::Incomplete);
        }
        for i in 0..state.configs().len() {
            let config = state.configs()[i].clone();
            if config.status() == ConfigStatus::Complete {
                continue;
            }
            let symbol = match config.next_symbol() {
                Some(symbol) => symbol,
                None => continue,
            };
            let mut pool = ConfigPool::new();
            for other in state.configs()[i..].iter() {
                if other.status() == ConfigStatus::Complete {
                    continue;
                }
                match other.next_symbol() {
                    Some(other_symbol) if other_symbol == symbol => (),
                    _ => continue,
                }
                other.set_status(ConfigStatus::Complete);
                let advanced = pool.add_basis(other.rule(), other.dot() + 1);
                advanced.add_backward(other);
            }
            let target = self.get_state(pool);
            state.add_action(Action::shift(symbol, target));
        }
    }

    /// Invert every backward link into a forward link on its source.
    fn find_links(&self) {
        for state in self.states.iter() {
            for config in state.configs() {
                for source in config.take_backward() {
                    source.add_forward(config);
                }
            }
        }
    }

    /// Union follow sets along the forward links until nothing changes.
    fn find_follow_sets(&self) {
        for state in self.states.iter() {
            for config in state.configs() {
                config.set_status(ConfigStatus::Incomplete);
            }
        }
        let mut progress = true;
        while progress {
            progress = false;
            for state in self.states.iter() {
                for config in state.configs() {
                    if config.status() == ConfigStatus::Complete {
                        continue;
                    }
                    for target in config.forward() {
                        if target.union_follow_from(config) {
                            target.set_status(ConfigStatus::Incomplete);
                            progress = true;
                        }
                    }
                    config.set_status(ConfigStatus::Complete);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::parse_grammar;

    fn build(text: &str) -> (Grammar, Vec<State>) {
        let mut grammar = Grammar::new("test.y");
        parse_grammar(text, &mut grammar);
        grammar.prepare();
        assert_eq!(grammar.error_count(), 0);
        let states = StateBuilder::build(&grammar);
        (grammar, states)
    }

    fn find_config(states: &[State], rule: u32, dot: usize) -> Config {
        for state in states {
            for config in state.configs() {
                if config.key() == (rule, dot) {
                    return config.clone();
                }
            }
        }
        panic!("no configuration ({}, {})", rule, dot);
    }

    #[test]
    fn minimal_grammar_has_four_states() {
        let (_grammar, states) = build("s ::= a . a ::= A .");
        assert_eq!(states.len(), 4);
    }

    #[test]
    fn state_zero_holds_full_closure() {
        let (_grammar, states) = build("s ::= a . a ::= A .");
        assert_eq!(states[0].basis().len(), 1);
        assert_eq!(states[0].configs().len(), 3);
    }

    #[test]
    fn equal_bases_share_a_state() {
        // Both arms end with the same trailing configurations for c.
        let (_grammar, states) = build("s ::= X c . s ::= Y c . c ::= C .");
        let c_starts: Vec<u32> = states
            .iter()
            .flat_map(|state| state.configs().iter())
            .filter(|config| config.key() == (2, 1))
            .map(|config| config.state())
            .collect();
        assert_eq!(c_starts.len(), 1);
    }

    #[test]
    fn follow_propagates_through_links() {
        let (grammar, states) = build("s ::= a . a ::= A .");
        let end = grammar.symbols.end_symbol().ident();
        // a ::= A * must be reducible on end-of-input.
        let config = find_config(&states, 1, 1);
        assert!(config.is_reducible());
        assert!(config.follow().contains(end));
    }

    #[test]
    fn follow_seeded_from_rule_remainder() {
        let (grammar, states) = build("s ::= a B . a ::= A .");
        let b = grammar.symbols.find("B").unwrap().ident();
        let config = find_config(&states, 1, 1);
        assert!(config.follow().contains(b));
        let end = grammar.symbols.end_symbol().ident();
        assert!(!config.follow().contains(end));
    }

    #[test]
    fn lambda_remainder_keeps_propagating() {
        let (grammar, states) = build("s ::= a opt . a ::= A . opt ::= . opt ::= B .");
        let config = find_config(&states, 1, 1);
        let b = grammar.symbols.find("B").unwrap().ident();
        let end = grammar.symbols.end_symbol().ident();
        // FIRST(opt) seeds B; opt being lambda lets end-of-input through.
        assert!(config.follow().contains(b));
        assert!(config.follow().contains(end));
    }

    #[test]
    fn shift_actions_cover_leading_symbols() {
        let (_grammar, states) = build("s ::= a . a ::= A .");
        let state0 = &states[0];
        let shifted: Vec<String> = state0
            .actions()
            .iter()
            .map(|action| action.lookahead().name().to_string())
            .collect();
        assert!(shifted.contains(&"A".to_string()));
        assert!(shifted.contains(&"a".to_string()));
        assert!(shifted.contains(&"s".to_string()));
    }
}
