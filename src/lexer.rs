use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::machine::Absorbed;
use crate::machine::Machine;
use crate::matcher::Matcher;
use crate::states::StateIdx;
use crate::transitions::TransitionKind;

/// A machine with multiple named entry points ("start codes") that fires
/// actions when attached recognizers accept. The empty string names the
/// default start code.
///
/// An action's `exit_code` makes it a mode switch: firing the action leaves
/// the machine at the exit code's start state for the next lexeme.
#[derive(Debug)]
pub struct Lexer {
	machine: Machine,
	start_codes: BTreeMap<String, StateIdx>,
}

impl Lexer {
	pub fn new() -> Self {
		let machine: Machine = Machine::new(true, Some(""));
		let mut start_codes: BTreeMap<String, StateIdx> = BTreeMap::new();
		start_codes.insert(String::new(), machine.start());
		Self { machine, start_codes }
	}

	/// The start state for `code`, created on demand.
	pub fn get_start(&mut self, code: &str) -> StateIdx {
		if let Some(&existing) = self.start_codes.get(code) {
			return existing;
		}
		let state: StateIdx = self.machine.new_state(true, Some(code));
		self.start_codes.insert(code.to_owned(), state);
		state
	}

	/// The known start codes with their states, sorted by code.
	pub fn start_codes(&self) -> impl Iterator<Item = (&str, StateIdx)> + '_ {
		self.start_codes.iter().map(|(code, &state)| (code.as_str(), state))
	}

	/// Attach a recognizer under the default start code; see
	/// [`Lexer::action_at`].
	pub fn action(&mut self, sub: Matcher, action: impl Into<String>, precedence: i32) -> &mut Self {
		self.action_at(sub, action, precedence, "", None, None)
	}

	/// Attach `sub` under `code`: an epsilon runs from the code's start
	/// state into the recognizer, and an action transition runs from the
	/// recognizer's final state to the `exit_code` start (default: back to
	/// `code`), carrying the action text, its precedence, and an optional
	/// diagnostic name.
	pub fn action_at(
		&mut self,
		sub: Matcher,
		action: impl Into<String>,
		precedence: i32,
		code: &str,
		exit_code: Option<&str>,
		name: Option<&str>,
	) -> &mut Self {
		let action: String = action.into();
		debug!("attaching action {action:?} (precedence {precedence}) under code {code:?}");

		let mut sub: Matcher = sub;
		// Materialize the recognizer's final so it survives the re-base.
		sub.machine_mut().final_state();
		let absorbed: Absorbed = self.machine.absorb(sub.into_machine());

		let start: StateIdx = self.get_start(code);
		let exit: StateIdx = self.get_start(exit_code.unwrap_or(code));

		self.machine.transition(start, absorbed.start, TransitionKind::Epsilon);
		if let Some(sub_final) = absorbed.final_state {
			self.machine.transition(
				sub_final,
				exit,
				TransitionKind::Action {
					action,
					precedence,
					name: name.map(str::to_owned),
				},
			);
			self.machine.set_accepting(sub_final, false);
		}
		self
	}

	/// Enumerate all states: start states first, sorted by start code,
	/// interior states next, other accepting states last.
	pub fn iter_states(&self) -> impl Iterator<Item = StateIdx> {
		let starts: Vec<StateIdx> = self.start_codes.values().copied().collect::<Vec<_>>();
		self.machine.ordered_states(starts).into_iter()
	}

	/// Lower to a deterministic lexer. Start codes carry over: a produced
	/// state standing for a closure that contains a coded start state
	/// inherits that code. (No epsilon path connects two start states, so a
	/// closure holds at most one code.)
	pub fn dfa(&self) -> Lexer {
		let (mut mach, closure_map): (Machine, BTreeMap<BTreeSet<StateIdx>, StateIdx>) = self.machine.dfa_mapped();

		let mut start_codes: BTreeMap<String, StateIdx> = BTreeMap::new();
		for (closure, &dfa_state) in closure_map.iter() {
			for &substate in closure.iter() {
				if let Some(code) = self.machine[substate].code() {
					mach.set_code(dfa_state, Some(code.to_owned()));
					start_codes.insert(code.to_owned(), dfa_state);
				}
			}
		}

		Lexer {
			machine: mach,
			start_codes,
		}
	}

	pub fn machine(&self) -> &Machine {
		&self.machine
	}

	pub fn machine_mut(&mut self) -> &mut Machine {
		&mut self.machine
	}

	pub fn into_machine(self) -> Machine {
		self.machine
	}
}
