use std::cell::Cell;
use std::collections::BTreeSet;

use crate::transitions::NUM_PRIORITIES;

/// Handle to a state in its owning machine's arena. Identity comparison of
/// states is comparison of handles.
#[derive(Debug, Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StateIdx(pub(crate) usize);

/// Handle to a transition in its owning machine's arena.
#[derive(Debug, Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TransIdx(pub(crate) usize);

/// An automaton state: a node remembering the transitions in and out of it,
/// bucketed by transition priority.
#[derive(Debug, Clone)]
pub struct State {
	accepting: bool,
	/// Start-code tag; only populated on a lexer's start states.
	code: Option<String>,
	/// Diagnostic label, assigned by external consumers.
	name: Option<String>,
	trans_in: [BTreeSet<TransIdx>; NUM_PRIORITIES],
	trans_out: [BTreeSet<TransIdx>; NUM_PRIORITIES],
	/// Cached answers for the epsilon-only predicates; cleared whenever a
	/// transition is attached or detached on the corresponding side.
	eps_in_cache: Cell<Option<bool>>,
	eps_out_cache: Cell<Option<bool>>,
}

/// Priority 0 transitions are epsilons by definition, so a table is
/// epsilon-only when every other bucket is empty.
fn all_eps(table: &[BTreeSet<TransIdx>; NUM_PRIORITIES]) -> bool {
	table[1..].iter().all(BTreeSet::is_empty)
}

impl State {
	pub fn new(accepting: bool, code: Option<String>) -> Self {
		Self {
			accepting,
			code,
			name: None,
			trans_in: std::array::from_fn(|_| BTreeSet::new()),
			trans_out: std::array::from_fn(|_| BTreeSet::new()),
			eps_in_cache: Cell::new(None),
			eps_out_cache: Cell::new(None),
		}
	}

	pub fn accepting(&self) -> bool {
		self.accepting
	}

	pub(crate) fn set_accepting(&mut self, accepting: bool) {
		self.accepting = accepting;
	}

	pub fn code(&self) -> Option<&str> {
		self.code.as_deref()
	}

	pub(crate) fn set_code(&mut self, code: Option<String>) {
		self.code = code;
	}

	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	pub fn set_name(&mut self, name: Option<String>) {
		self.name = name;
	}

	/// Swap the in/out tables. Used with endpoint swaps on the transitions
	/// when reversing a whole machine.
	pub(crate) fn reverse(&mut self) {
		std::mem::swap(&mut self.trans_in, &mut self.trans_out);
		self.eps_in_cache.swap(&self.eps_out_cache);
	}

	pub(crate) fn attach_in(&mut self, prio: usize, id: TransIdx) {
		self.trans_in[prio].insert(id);
		self.eps_in_cache.set(None);
	}

	pub(crate) fn attach_out(&mut self, prio: usize, id: TransIdx) {
		self.trans_out[prio].insert(id);
		self.eps_out_cache.set(None);
	}

	pub(crate) fn detach_in(&mut self, prio: usize, id: TransIdx) {
		self.trans_in[prio].remove(&id);
		self.eps_in_cache.set(None);
	}

	pub(crate) fn detach_out(&mut self, prio: usize, id: TransIdx) {
		self.trans_out[prio].remove(&id);
		self.eps_out_cache.set(None);
	}

	/// Re-base all transition handles after this state's tables were appended
	/// to another machine's arena.
	pub(crate) fn shift_transitions(&mut self, offset: usize) {
		for bucket in self.trans_in.iter_mut().chain(self.trans_out.iter_mut()) {
			*bucket = bucket.iter().map(|id| TransIdx(id.0 + offset)).collect::<BTreeSet<_>>();
		}
	}

	/// Iterate incoming transitions, by ascending priority; all priorities
	/// when `prio` is `None`. Order within a priority is unspecified.
	pub fn iter_in(&self, prio: Option<usize>) -> impl Iterator<Item = TransIdx> + '_ {
		Self::iter_table(&self.trans_in, prio)
	}

	/// Iterate outgoing transitions; see [`State::iter_in`].
	pub fn iter_out(&self, prio: Option<usize>) -> impl Iterator<Item = TransIdx> + '_ {
		Self::iter_table(&self.trans_out, prio)
	}

	fn iter_table(
		table: &[BTreeSet<TransIdx>; NUM_PRIORITIES],
		prio: Option<usize>,
	) -> impl Iterator<Item = TransIdx> + '_ {
		let prios: std::ops::Range<usize> = match prio {
			Some(p) => {
				assert!(p < NUM_PRIORITIES);
				p..p + 1
			},
			None => 0..NUM_PRIORITIES,
		};
		prios.flat_map(move |p| table[p].iter().copied())
	}

	/// `true` iff every incoming transition is an epsilon.
	pub fn eps_in(&self) -> bool {
		if let Some(cached) = self.eps_in_cache.get() {
			return cached;
		}
		let result: bool = all_eps(&self.trans_in);
		self.eps_in_cache.set(Some(result));
		result
	}

	/// `true` iff every outgoing transition is an epsilon.
	pub fn eps_out(&self) -> bool {
		if let Some(cached) = self.eps_out_cache.get() {
			return cached;
		}
		let result: bool = all_eps(&self.trans_out);
		self.eps_out_cache.set(Some(result));
		result
	}
}
