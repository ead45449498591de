use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::states::State;
use crate::states::StateIdx;
use crate::states::TransIdx;
use crate::transitions::NUM_PRIORITIES;
use crate::transitions::Transition;
use crate::transitions::TransitionKind;

/// A finite-state recognizer. The machine exclusively owns its states and
/// transitions in two arenas; states and transitions refer to each other
/// through handles, which sidesteps the cyclic ownership of the
/// state/transition graph.
///
/// Transition slots that get merged away stay behind in the arena,
/// unreferenced by any state table; iteration always goes through the
/// tables, never the raw arena.
#[derive(Debug)]
pub struct Machine {
	states: Vec<State>,
	transitions: Vec<Transition>,
	start: StateIdx,
	accepting: BTreeSet<StateIdx>,
	/// The unique accepting state, materialized lazily by
	/// [`Machine::unify_accepting`] when several exist.
	final_cache: Option<StateIdx>,
}

/// Handles of an absorbed machine, re-based into the absorbing arena.
#[derive(Debug)]
pub(crate) struct Absorbed {
	pub start: StateIdx,
	pub accepting: BTreeSet<StateIdx>,
	pub final_state: Option<StateIdx>,
}

impl Machine {
	pub fn new(accepting: bool, code: Option<&str>) -> Self {
		let start: StateIdx = StateIdx(0);
		let mut accepting_set: BTreeSet<StateIdx> = BTreeSet::new();
		if accepting {
			accepting_set.insert(start);
		}
		Self {
			states: vec![State::new(accepting, code.map(str::to_owned))],
			transitions: Vec::new(),
			start,
			accepting: accepting_set,
			final_cache: None,
		}
	}

	pub fn start(&self) -> StateIdx {
		self.start
	}

	pub fn num_states(&self) -> usize {
		self.states.len()
	}

	pub fn accepting_states(&self) -> &BTreeSet<StateIdx> {
		&self.accepting
	}

	pub fn new_state(&mut self, accepting: bool, code: Option<&str>) -> StateIdx {
		let idx: StateIdx = StateIdx(self.states.len());
		self.states.push(State::new(accepting, code.map(str::to_owned)));
		if accepting {
			self.accepting.insert(idx);
			self.final_cache = None;
		}
		idx
	}

	pub(crate) fn set_accepting(&mut self, idx: StateIdx, accepting: bool) {
		self.states[idx.0].set_accepting(accepting);
		if accepting {
			self.accepting.insert(idx);
		} else {
			self.accepting.remove(&idx);
		}
		self.final_cache = None;
	}

	pub(crate) fn set_code(&mut self, idx: StateIdx, code: Option<String>) {
		self.states[idx.0].set_code(code);
	}

	/// Add a transition from `from` to `to`, first merging with any existing
	/// transitions sharing the same priority and destination: parallel
	/// epsilons collapse to one, character sets fold by union, and competing
	/// actions keep only the smallest precedence (ties keep the incumbent).
	pub fn transition(&mut self, from: StateIdx, to: StateIdx, kind: TransitionKind) {
		let prio: usize = kind.priority();

		// Priorities are in bijection with the variants, so sharing the
		// priority bucket means sharing the variant.
		let existing: Vec<TransIdx> = self.states[from.0]
			.iter_out(Some(prio))
			.filter(|&id| self.transitions[id.0].state_in() == to)
			.collect::<Vec<_>>();

		match kind {
			TransitionKind::Epsilon => {
				if existing.is_empty() {
					self.link(from, to, TransitionKind::Epsilon);
				}
			},
			TransitionKind::MatchChar { mut cset } => {
				for &id in existing.iter() {
					if let TransitionKind::MatchChar { cset: other } = self.transitions[id.0].kind() {
						cset |= other;
					}
				}
				for &id in existing.iter() {
					self.unlink(id);
				}
				self.link(from, to, TransitionKind::MatchChar { cset });
			},
			TransitionKind::Action {
				action,
				precedence,
				name,
			} => {
				let mut incumbent: Option<(TransIdx, i32)> = None;
				for &id in existing.iter() {
					if let TransitionKind::Action { precedence: p, .. } = self.transitions[id.0].kind() {
						if incumbent.is_none_or(|(_, best)| *p < best) {
							incumbent = Some((id, *p));
						}
					}
				}
				match incumbent {
					Some((keep, best)) if best <= precedence => {
						for &id in existing.iter() {
							if id != keep {
								self.unlink(id);
							}
						}
					},
					_ => {
						for &id in existing.iter() {
							self.unlink(id);
						}
						self.link(
							from,
							to,
							TransitionKind::Action {
								action,
								precedence,
								name,
							},
						);
					},
				}
			},
		}
	}

	fn link(&mut self, from: StateIdx, to: StateIdx, kind: TransitionKind) -> TransIdx {
		let prio: usize = kind.priority();
		let id: TransIdx = TransIdx(self.transitions.len());
		self.transitions.push(Transition::new(from, to, kind));
		self.states[from.0].attach_out(prio, id);
		self.states[to.0].attach_in(prio, id);
		id
	}

	/// Detach a transition from both of its endpoints; a transition lives in
	/// both tables or in neither.
	fn unlink(&mut self, id: TransIdx) {
		let (from, to, prio): (StateIdx, StateIdx, usize) = {
			let trans: &Transition = &self.transitions[id.0];
			(trans.state_out(), trans.state_in(), trans.priority())
		};
		self.states[from.0].detach_out(prio, id);
		self.states[to.0].detach_in(prio, id);
	}

	/// The set of states reachable from `seeds` through epsilon transitions,
	/// `seeds` included.
	pub fn eps_closure<Seeds>(&self, seeds: Seeds) -> BTreeSet<StateIdx>
	where
		Seeds: IntoIterator<Item = StateIdx>,
	{
		let mut closure: BTreeSet<StateIdx> = seeds.into_iter().collect::<BTreeSet<_>>();
		let mut stack: Vec<StateIdx> = closure.iter().copied().collect::<Vec<_>>();

		while let Some(state) = stack.pop() {
			for id in self.states[state.0].iter_out(Some(0)) {
				let target: StateIdx = self.transitions[id.0].state_in();
				if closure.insert(target) {
					stack.push(target);
				}
			}
		}

		closure
	}

	/// Displace the start with a fresh state carrying its accepting flag and
	/// start code, connected by an epsilon. The old start is demoted to an
	/// interior state.
	pub(crate) fn add_start(&mut self) -> StateIdx {
		let old: StateIdx = self.start;
		let accepting: bool = self.states[old.0].accepting();
		let code: Option<String> = self.states[old.0].code().map(str::to_owned);

		let new: StateIdx = self.new_state(accepting, code.as_deref());
		self.transition(new, old, TransitionKind::Epsilon);

		self.set_accepting(old, false);
		self.states[old.0].set_code(None);
		self.start = new;

		new
	}

	/// Funnel all accepting states into one fresh accepting state through
	/// epsilon transitions. The new state is created non-accepting first so
	/// it does not receive an epsilon from itself.
	pub(crate) fn unify_accepting(&mut self) -> StateIdx {
		let new: StateIdx = self.new_state(false, None);
		let currently: Vec<StateIdx> = self.accepting.iter().copied().collect::<Vec<_>>();
		for state in currently.into_iter() {
			self.transition(state, new, TransitionKind::Epsilon);
			self.set_accepting(state, false);
		}
		self.set_accepting(new, true);
		self.final_cache = Some(new);
		new
	}

	/// The unique accepting state, unifying first when there are several.
	/// `None` when the machine has no accepting state at all.
	pub fn final_state(&mut self) -> Option<StateIdx> {
		if self.final_cache.is_none() {
			self.final_cache = match self.accepting.len() {
				0 => None,
				1 => self.accepting.iter().next().copied(),
				_ => Some(self.unify_accepting()),
			};
		}
		self.final_cache
	}

	/// Append another machine's states and transitions to this arena,
	/// re-basing every handle. Taking `other` by value is what retires it:
	/// its states now belong to this machine.
	pub(crate) fn absorb(&mut self, other: Machine) -> Absorbed {
		let Machine {
			states,
			transitions,
			start,
			accepting,
			final_cache,
		} = other;

		let state_offset: usize = self.states.len();
		let trans_offset: usize = self.transitions.len();

		for mut state in states.into_iter() {
			state.shift_transitions(trans_offset);
			self.states.push(state);
		}
		for mut trans in transitions.into_iter() {
			trans.shift_states(state_offset);
			self.transitions.push(trans);
		}

		Absorbed {
			start: StateIdx(start.0 + state_offset),
			accepting: accepting
				.into_iter()
				.map(|idx| StateIdx(idx.0 + state_offset))
				.collect::<BTreeSet<_>>(),
			final_state: final_cache.map(|idx| StateIdx(idx.0 + state_offset)),
		}
	}

	/// Replace the accepting set wholesale; used after an absorb, once the
	/// caller has reconciled the absorbed states' accepting flags.
	pub(crate) fn set_accepting_set(&mut self, accepting: BTreeSet<StateIdx>, final_state: Option<StateIdx>) {
		self.accepting = accepting;
		self.final_cache = final_state;
	}

	/// An independent duplicate: fresh states created on first demand with
	/// the same accepting flag and code, every reachable transition cloned
	/// by payload with mapped endpoints.
	pub fn copy(&self) -> Machine {
		fn mapped(copy: &mut Machine, map: &mut [Option<StateIdx>], src: &Machine, idx: StateIdx) -> StateIdx {
			if let Some(existing) = map[idx.0] {
				return existing;
			}
			let state: &State = &src.states[idx.0];
			let new: StateIdx = copy.new_state(state.accepting(), state.code());
			map[idx.0] = Some(new);
			new
		}

		let start_state: &State = &self.states[self.start.0];
		let mut copy: Machine = Machine::new(start_state.accepting(), start_state.code());

		let mut state_map: Vec<Option<StateIdx>> = vec![None; self.states.len()];
		state_map[self.start.0] = Some(copy.start);

		for i in 0..self.states.len() {
			let out: Vec<TransIdx> = self.states[i].iter_out(None).collect::<Vec<_>>();
			for id in out.into_iter() {
				let (target, kind): (StateIdx, TransitionKind) = {
					let trans: &Transition = &self.transitions[id.0];
					(trans.state_in(), trans.kind().clone())
				};
				let from: StateIdx = mapped(&mut copy, &mut state_map, self, StateIdx(i));
				let to: StateIdx = mapped(&mut copy, &mut state_map, self, target);
				copy.transition(from, to, kind);
			}
		}

		copy
	}

	/// Reverse in place: swap every linked transition's endpoints and every
	/// state's tables, then trade the roles of the start and final states
	/// (accepting flag and start code move with the role).
	pub fn reverse(&mut self) {
		let start: StateIdx = self.start;
		let maybe_final: Option<StateIdx> = self.final_state();

		let linked: Vec<TransIdx> = self
			.states
			.iter()
			.flat_map(|state| state.iter_out(None))
			.collect::<Vec<_>>();
		for id in linked.into_iter() {
			self.transitions[id.0].reverse();
		}
		for state in self.states.iter_mut() {
			state.reverse();
		}

		if let Some(final_state) = maybe_final {
			if final_state != start {
				self.start = final_state;
				self.set_accepting(final_state, false);
				self.set_accepting(start, true);
				let code: Option<String> = self.states[start.0].code().map(str::to_owned);
				self.states[final_state.0].set_code(code);
				self.states[start.0].set_code(None);
				self.final_cache = Some(start);
			}
		}
	}

	/// Subset construction: produce a machine with no epsilon transitions
	/// and no two overlapping character transitions out of any state.
	/// Action transitions survive (they consume nothing and are
	/// disambiguated by precedence when merged).
	pub fn dfa(&self) -> Machine {
		self.dfa_mapped().0
	}

	/// As [`Machine::dfa`], also returning the closure that each produced
	/// state stands for.
	#[tracing::instrument(skip(self))]
	pub(crate) fn dfa_mapped(&self) -> (Machine, BTreeMap<BTreeSet<StateIdx>, StateIdx>) {
		let mut mach: Machine = Machine::new(false, None);

		let start_closure: BTreeSet<StateIdx> = self.eps_closure([self.start]);
		if !start_closure.is_disjoint(&self.accepting) {
			mach.set_accepting(mach.start, true);
		}

		let mut closure_map: BTreeMap<BTreeSet<StateIdx>, StateIdx> = BTreeMap::new();
		closure_map.insert(start_closure.clone(), mach.start);
		let mut worklist: Vec<BTreeSet<StateIdx>> = vec![start_closure];

		while let Some(closure) = worklist.pop() {
			let current: StateIdx = closure_map[&closure];

			// Bucket the closure's non-epsilon fan-out by priority
			// (equivalently, by variant).
			let mut buckets: [Vec<Transition>; NUM_PRIORITIES] = std::array::from_fn(|_| Vec::new());
			for &substate in closure.iter() {
				for id in self.states[substate.0].iter_out(None) {
					let trans: &Transition = &self.transitions[id.0];
					let prio: usize = trans.priority();
					if prio == 0 {
						continue;
					}
					buckets[prio].push(trans.clone());
				}
			}

			for bucket in buckets.into_iter() {
				if bucket.is_empty() {
					continue;
				}
				for group in Transition::disjoint(bucket).into_iter() {
					let dest_closure: BTreeSet<StateIdx> =
						self.eps_closure(group.iter().map(|trans| trans.state_in()));

					let dest: StateIdx = match closure_map.get(&dest_closure) {
						Some(&known) => known,
						None => {
							let accepting: bool = !dest_closure.is_disjoint(&self.accepting);
							let new: StateIdx = mach.new_state(accepting, None);
							debug!("created {new:?} for closure {dest_closure:?}");
							closure_map.insert(dest_closure.clone(), new);
							worklist.push(dest_closure);
							new
						},
					};

					// The group was built so its payload is shared; the
					// first transition's payload stands for all of them.
					let payload: TransitionKind = match group.first() {
						Some(first) => first.kind().clone(),
						None => continue,
					};
					mach.transition(current, dest, payload);
				}
			}
		}

		(mach, closure_map)
	}

	/// Enumerate all states: start states first, interior states next, then
	/// the remaining accepting states.
	pub fn iter_states(&self) -> impl Iterator<Item = StateIdx> {
		self.ordered_states(vec![self.start]).into_iter()
	}

	pub(crate) fn ordered_states(&self, starts: Vec<StateIdx>) -> Vec<StateIdx> {
		let start_set: BTreeSet<StateIdx> = starts.iter().copied().collect::<BTreeSet<_>>();
		let lasts: BTreeSet<StateIdx> = self.accepting.difference(&start_set).copied().collect::<BTreeSet<_>>();

		let mut ordered: Vec<StateIdx> = starts;
		for i in 0..self.states.len() {
			let idx: StateIdx = StateIdx(i);
			if start_set.contains(&idx) || lasts.contains(&idx) {
				continue;
			}
			ordered.push(idx);
		}
		ordered.extend(lasts.iter().copied());
		ordered
	}
}

impl std::ops::Index<StateIdx> for Machine {
	type Output = State;

	fn index(&self, i: StateIdx) -> &Self::Output {
		&self.states[i.0]
	}
}

impl std::ops::IndexMut<StateIdx> for Machine {
	fn index_mut(&mut self, i: StateIdx) -> &mut Self::Output {
		&mut self.states[i.0]
	}
}

impl std::ops::Index<TransIdx> for Machine {
	type Output = Transition;

	fn index(&self, i: TransIdx) -> &Self::Output {
		&self.transitions[i.0]
	}
}
