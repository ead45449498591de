use crate::charset::CharSet;
use crate::simulator::Simulate;
use crate::states::StateIdx;

/// Transition priorities are dense and double as the variant discriminant:
/// epsilon transitions are always checked first, character matches next,
/// actions last.
pub const NUM_PRIORITIES: usize = 3;

/// A directed edge between two states. `state_out` is the origin (the edge
/// leads *out* of it), `state_in` the destination (the edge leads *into* it).
/// Both endpoint states hold the transition in their tables; removal must
/// update both sides.
#[derive(Debug, Clone)]
pub struct Transition {
	state_out: StateIdx,
	state_in: StateIdx,
	kind: TransitionKind,
}

#[derive(Debug, Clone)]
pub enum TransitionKind {
	/// Taken without consuming input; only meaningful before lowering.
	Epsilon,
	/// Consumes one character if and only if it lies in `cset`.
	MatchChar { cset: CharSet },
	/// Fires a lexer action without consuming input. When several actions
	/// compete for the same pair of states, the numerically smallest
	/// `precedence` wins.
	Action {
		action: String,
		precedence: i32,
		name: Option<String>,
	},
}

impl Transition {
	pub fn new(state_out: StateIdx, state_in: StateIdx, kind: TransitionKind) -> Self {
		Self {
			state_out,
			state_in,
			kind,
		}
	}

	pub fn state_out(&self) -> StateIdx {
		self.state_out
	}

	pub fn state_in(&self) -> StateIdx {
		self.state_in
	}

	pub fn kind(&self) -> &TransitionKind {
		&self.kind
	}

	pub fn priority(&self) -> usize {
		self.kind.priority()
	}

	/// Swap the endpoints in place. Reversing the transitions alone is not
	/// enough to reverse an automaton; the states' tables must be swapped
	/// too.
	pub fn reverse(&mut self) {
		std::mem::swap(&mut self.state_out, &mut self.state_in);
	}

	/// Re-base the endpoint handles after this transition was appended to
	/// another machine's arena.
	pub(crate) fn shift_states(&mut self, offset: usize) {
		self.state_out = StateIdx(self.state_out.0 + offset);
		self.state_in = StateIdx(self.state_in.0 + offset);
	}

	/// Decompose a list of same-priority transitions into groups that can
	/// coexist deterministically between an arbitrary fan-out.
	///
	/// Epsilon transitions are all equivalent; character transitions are
	/// split along the disjoint decomposition of their character sets, one
	/// new transition per owning original; action transitions are never
	/// equivalent and come back as singletons.
	pub fn disjoint(transitions: Vec<Transition>) -> Vec<Vec<Transition>> {
		// The priority doubles as the variant discriminant.
		let prio: usize = match transitions.first() {
			Some(first) => first.priority(),
			None => {
				return Vec::new();
			},
		};
		match prio {
			0 => vec![transitions],
			1 => {
				let csets: Vec<&CharSet> = transitions
					.iter()
					.map(|trans| match &trans.kind {
						TransitionKind::MatchChar { cset } => cset,
						_ => unreachable!("mixed variants in a disjoint bucket"),
					})
					.collect::<Vec<_>>();

				let mut groups: Vec<Vec<Transition>> = Vec::new();
				for (piece, owners) in CharSet::disjoint(csets.iter().copied()) {
					let group: Vec<Transition> = owners
						.iter()
						.map(|&i| Transition {
							state_out: transitions[i].state_out,
							state_in: transitions[i].state_in,
							kind: TransitionKind::MatchChar { cset: piece.clone() },
						})
						.collect::<Vec<_>>();
					groups.push(group);
				}
				groups
			},
			_ => transitions.into_iter().map(|trans| vec![trans]).collect::<Vec<_>>(),
		}
	}

	/// Simulator hook; see [`TransitionKind::matches`].
	pub fn matches<Sim: Simulate>(&self, maybe_char: Option<char>, sim: &mut Sim) -> bool {
		self.kind.matches(maybe_char, sim)
	}
}

impl TransitionKind {
	pub fn priority(&self) -> usize {
		match self {
			Self::Epsilon => 0,
			Self::MatchChar { .. } => 1,
			Self::Action { .. } => 2,
		}
	}

	// Payload accessors for consumers that don't want to match on the
	// variant.

	pub fn cset(&self) -> Option<&CharSet> {
		match self {
			Self::MatchChar { cset } => Some(cset),
			_ => None,
		}
	}

	pub fn action(&self) -> Option<&str> {
		match self {
			Self::Action { action, .. } => Some(action),
			_ => None,
		}
	}

	pub fn precedence(&self) -> Option<i32> {
		match self {
			&Self::Action { precedence, .. } => Some(precedence),
			_ => None,
		}
	}

	pub fn name(&self) -> Option<&str> {
		match self {
			Self::Action { name, .. } => name.as_deref(),
			_ => None,
		}
	}

	/// Decide whether the transition is taken. A matching character
	/// transition consumes its character through `sim`; an action transition
	/// always matches, extracting the lexeme, restarting the lexeme window,
	/// and firing the action, without consuming. Epsilon transitions never
	/// match: the simulator walks lowered machines only.
	pub fn matches<Sim: Simulate>(&self, maybe_char: Option<char>, sim: &mut Sim) -> bool {
		match self {
			Self::Epsilon => false,
			Self::MatchChar { cset } => match maybe_char {
				Some(ch) if cset.contains(ch) => {
					sim.consume();
					true
				},
				_ => false,
			},
			Self::Action {
				action,
				precedence: _,
				name,
			} => {
				let lexeme: String = sim.get_lexeme().to_owned();
				sim.start_lexeme();
				sim.action(name.as_deref(), action, &lexeme);
				true
			},
		}
	}
}
