use std::str::Chars;

use nom::Err as NomErr;
use nom::IResult;
use nom::Parser;
use nom::error::ErrorKind as NomErrorKind;
use nom::error::FromExternalError;
use nom::error::ParseError;

use crate::charset;
use crate::charset::CharSet;
use crate::charset::Range;
use crate::matcher::Matcher;
use crate::matcher::Repeat;

const SPECIAL_CHARACTERS: &str = r"\()[]{}*+?-.|^";

#[derive(Debug)]
pub struct PatternError<'a> {
	consumed: &'a str,
	remaining: &'a str,
	kind: PatternErrorKind,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PatternErrorKind {
	/// Expected a certain character, e.g. the '}' closing a repetition.
	ExpectedChar(char),
	/// Missing the closing delimiter for the following pair.
	MissingClose(char, char),
	/// "General" error kind, e.g. an isolated repetition suffix operator
	/// (the pattern "*").
	InvalidTerm,
	/// A valid literal character was expected but not found; should only
	/// appear from an invalid bracket group.
	InvalidLiteral,
	/// Invalid escape character.
	InvalidEscape,
	/// Invalid repetition bound; `min > max` or `max == 0`.
	InvalidRepetitionBound(u32, u32),
	/// Too large of a repetition bound.
	NumberTooBig,
	/// Expected decimal digits (for a repetition bound).
	ExpectedDecimalDigits,
	/// Expected hex digits (for a unicode escape).
	ExpectedHexDigits,
	/// Invalid code point in a unicode escape.
	InvalidCodePoint(u32),
	/// A bracket-group range running backwards, e.g. "[z-a]".
	InvalidClassRange(char, char),
	/// An escape class (e.g. "\\d") was used as an endpoint of a range in a
	/// bracket group.
	EscapeClassInGroupRange,
	/// An inverted escape class (e.g. "\\D") was used inside a bracket
	/// group.
	InvertedEscapeClassInGroup,
	/// Used for parsing a non-special character (`negate == true`) and for
	/// parsing an escaped special character (`negate == false`). This
	/// shouldn't bubble up publicly; it gets folded into `InvalidLiteral`
	/// or `InvalidTerm`, but it models what's happening and helps
	/// debugging.
	ExpectedOneOf { characters: &'static str, negate: bool },
	/// An error from nom; shouldn't happen, but needed to implement
	/// [`nom::error::ParseError`].
	Nom(NomErrorKind),
}

#[derive(Debug)]
struct PatternParsingError<'a> {
	pub input: &'a str,
	pub kind: PatternErrorKind,
}

/// A single literal position in a pattern: either one character or a whole
/// character class (from a class escape like "\\d").
#[derive(Debug)]
enum Literals {
	Single(char),
	Class { negated: bool, items: Vec<(char, char)> },
}

impl<'a> PatternError<'a> {
	pub fn kind(&self) -> PatternErrorKind {
		self.kind
	}

	/// The pattern prefix successfully consumed before the error.
	pub fn consumed(&self) -> &'a str {
		self.consumed
	}

	/// The unconsumed remainder starting at the error position.
	pub fn remaining(&self) -> &'a str {
		self.remaining
	}
}

impl<'a> ParseError<&'a str> for PatternParsingError<'a> {
	fn from_error_kind(input: &'a str, nom: NomErrorKind) -> Self {
		Self {
			input,
			kind: PatternErrorKind::Nom(nom),
		}
	}

	fn append(_input: &'a str, _kind: NomErrorKind, other: Self) -> Self {
		other
	}
}

impl<'a> FromExternalError<&'a str, Self> for PatternParsingError<'a> {
	fn from_external_error(_input: &'a str, _kind: NomErrorKind, e: Self) -> Self {
		e
	}
}

impl<'a> PatternParsingError<'a> {
	fn new(input: &'a str, kind: PatternErrorKind) -> Self {
		Self { input, kind }
	}
}

type ParsingResult<'a, T> = IResult<&'a str, T, PatternParsingError<'a>>;

impl Matcher {
	/// Compile a regex pattern onto the construction primitives: literals,
	/// '.', bracket groups, alternation, and the `* + ? {m} {m,n}`
	/// suffixes, with `\t \r \n`, `\u{…}` and the class escapes
	/// `\d \s \w \D \S \W`.
	pub fn from_pattern(pattern: &str) -> Result<Self, PatternError<'_>> {
		match parse_to_end(pattern) {
			Ok((remaining, matcher)) => {
				assert_eq!(remaining, "");
				Ok(matcher)
			},
			Err(NomErr::Incomplete(_)) => {
				panic!("no streaming parsers are used");
			},
			Err(NomErr::Error(err) | NomErr::Failure(err)) => {
				let consumed: &str = pattern.strip_suffix(err.input).unwrap_or("");
				Err(PatternError {
					consumed,
					remaining: err.input,
					kind: err.kind,
				})
			},
		}
	}
}

impl PatternErrorKind {
	fn error(self, input: &str) -> NomErr<PatternParsingError<'_>> {
		NomErr::Error(PatternParsingError::new(input, self))
	}

	fn diagnostic<'a, T>(self) -> impl Fn(&'a str) -> ParsingResult<'a, T> {
		move |input| Err(self.error(input))
	}
}

// ==================================

fn parse_to_end(input: &str) -> ParsingResult<'_, Matcher> {
	// `parse_sequence` (and consequently `parse_alternation`) may swallow
	// errors from `parse_suffixed`, since both are "lists" that simply
	// terminate when no more elements can be parsed. Here, after reaching
	// the end of the list, we ensure we're at the end of input, otherwise
	// "reproduce" the invalid term error.
	let (input, matcher): (&str, Matcher) = parse_alternation(input)?;

	if !input.is_empty() {
		return Err(PatternErrorKind::InvalidTerm.error(input));
	}

	Ok((input, matcher))
}

fn parse_alternation(input: &str) -> ParsingResult<'_, Matcher> {
	use nom::combinator::cut;
	use nom::combinator::opt;

	// Cut: any time we're trying to parse an alternation, we necessarily
	// are expecting at least one item.
	let (mut input, mut matcher): (&str, Matcher) = cut(parse_sequence).parse(input)?;

	loop {
		let maybe_bar: Option<char>;
		(input, maybe_bar) = opt(parse_char::<'|'>).parse(input)?;
		if maybe_bar.is_none() {
			break;
		}

		// Cut: after seeing a '|', we necessarily are expecting a sequence.
		match cut(parse_sequence).parse(input) {
			Ok((remaining, item)) => {
				input = remaining;
				matcher.alternate(item);
			},
			Err(NomErr::Error(_)) => {
				break;
			},
			Err(err @ (NomErr::Incomplete(_) | NomErr::Failure(_))) => {
				return Err(err);
			},
		}
	}

	Ok((input, matcher))
}

fn parse_sequence(input: &str) -> ParsingResult<'_, Matcher> {
	use nom::combinator::cut;

	// Cut: any time we're trying to parse a sequence, we necessarily are
	// expecting at least one item.
	let (mut input, mut matcher): (&str, Matcher) = cut(parse_suffixed).parse(input)?;

	loop {
		match parse_suffixed(input) {
			Ok((remaining, item)) => {
				input = remaining;
				matcher.concat(item);
			},
			Err(NomErr::Error(_)) => {
				break;
			},
			Err(err @ (NomErr::Incomplete(_) | NomErr::Failure(_))) => {
				return Err(err);
			},
		}
	}

	Ok((input, matcher))
}

fn parse_suffixed(input: &str) -> ParsingResult<'_, Matcher> {
	use nom::branch::alt;
	use nom::combinator::opt;

	let (input, mut matcher): (&str, Matcher) = parse_term(input)?;

	let (input, maybe_suffix): (&str, Option<Repeat>) = opt(alt((
		parse_char::<'*'>.map(|_| Repeat::STAR),
		parse_char::<'+'>.map(|_| Repeat::PLUS),
		parse_char::<'?'>.map(|_| Repeat::OPTIONAL),
		parse_repetition_suffix_modifier,
	)))
	.parse(input)?;

	if let Some(spec) = maybe_suffix {
		matcher *= spec;
	}

	Ok((input, matcher))
}

fn parse_repetition_suffix_modifier(input: &str) -> ParsingResult<'_, Repeat> {
	combinator_surrounded_cut::<'{', '}', _, _>(parse_repetition_bounds).parse(input)
}

fn parse_repetition_bounds(original_input: &str) -> ParsingResult<'_, Repeat> {
	use nom::combinator::cut;
	use nom::combinator::opt;

	let (input, x): (&str, u32) = parse_digits(original_input)?;

	let (input_after_comma, have_comma): (&str, bool) = opt(parse_char::<','>)
		.map(|maybe_comma| maybe_comma.is_some())
		.parse(input)?;

	if have_comma {
		// Cut: after seeing a ',', we necessarily are expecting an upper
		// bound.
		let (input, y): (&str, u32) = cut(parse_digits).parse(input_after_comma)?;
		match Repeat::bounded(x, Some(y)) {
			Ok(spec) => Ok((input, spec)),
			Err(_) => Err(PatternErrorKind::InvalidRepetitionBound(x, y).error(input_after_comma)),
		}
	} else {
		match Repeat::bounded(x, Some(x)) {
			Ok(spec) => Ok((input, spec)),
			Err(_) => Err(PatternErrorKind::InvalidRepetitionBound(x, x).error(original_input)),
		}
	}
}

fn parse_term(input: &str) -> ParsingResult<'_, Matcher> {
	use nom::branch::alt;

	alt((
		parse_char::<'.'>.map(|_| Matcher::for_cset(dot_cset())),
		parse_literal_character.map(|literal| match literal {
			Literals::Single(ch) => Matcher::for_cset(class_cset(false, &[(ch, ch)])),
			Literals::Class { negated, items } => Matcher::for_cset(class_cset(negated, &items)),
		}),
		parse_parenthesized,
		parse_group,
		PatternErrorKind::InvalidTerm.diagnostic(),
	))
	.parse(input)
}

fn parse_parenthesized(input: &str) -> ParsingResult<'_, Matcher> {
	combinator_surrounded_cut::<'(', ')', _, _>(parse_alternation).parse(input)
}

// ========================================

fn parse_group(input: &str) -> ParsingResult<'_, Matcher> {
	let (input, (negated, items)): (&str, (bool, Vec<(char, char)>)) =
		combinator_surrounded_cut::<'[', ']', _, _>(parse_group_inside).parse(input)?;

	Ok((input, Matcher::for_cset(class_cset(negated, &items))))
}

fn parse_group_inside(input: &str) -> ParsingResult<'_, (bool, Vec<(char, char)>)> {
	use nom::combinator::opt;

	let (input, negated): (&str, Option<char>) = opt(parse_char::<'^'>).parse(input)?;

	let (mut input, mut items): (&str, Vec<(char, char)>) = parse_group_item(input)?;
	loop {
		match parse_group_item(input) {
			Ok((new_input, new_items)) => {
				input = new_input;
				items.extend(&new_items);
			},
			Err(NomErr::Error(_)) => {
				break;
			},
			Err(err @ (NomErr::Failure(_) | NomErr::Incomplete(_))) => {
				return Err(err);
			},
		}
	}

	Ok((input, (negated.is_some(), items)))
}

fn parse_group_item(original_input: &str) -> ParsingResult<'_, Vec<(char, char)>> {
	use nom::combinator::cut;
	use nom::combinator::opt;

	let (input, start): (&str, Literals) = parse_literal_character(original_input)?;

	let (input_after_dash, maybe_dash): (&str, Option<char>) = opt(parse_char::<'-'>).parse(input)?;

	if maybe_dash.is_some() {
		match start {
			Literals::Single(start) => {
				let (input, end): (&str, Literals) = cut(parse_literal_character).parse(input_after_dash)?;
				match end {
					Literals::Single(end) => {
						if start > end {
							Err(PatternErrorKind::InvalidClassRange(start, end).error(original_input))
						} else {
							Ok((input, vec![(start, end)]))
						}
					},
					Literals::Class { .. } => Err(PatternErrorKind::EscapeClassInGroupRange.error(input_after_dash)),
				}
			},
			Literals::Class { .. } => Err(PatternErrorKind::EscapeClassInGroupRange.error(original_input)),
		}
	} else {
		match start {
			Literals::Single(ch) => Ok((input, vec![(ch, ch)])),
			Literals::Class { negated, items } => {
				if negated {
					return Err(PatternErrorKind::InvertedEscapeClassInGroup.error(original_input));
				}
				Ok((input, items))
			},
		}
	}
}

// ========================================

fn parse_literal_character(input: &str) -> ParsingResult<'_, Literals> {
	use nom::branch::alt;

	alt((
		parse_escaped_character,
		parse_one_char_of::<true>(SPECIAL_CHARACTERS).map(Literals::Single),
		PatternErrorKind::InvalidLiteral.diagnostic(),
	))
	.parse(input)
}

fn parse_escaped_character(original_input: &str) -> ParsingResult<'_, Literals> {
	use nom::branch::alt;
	use nom::combinator::cut;

	let (input, _): (&str, char) = parse_char::<'\\'>(original_input)?;

	// Cut: if we parsed a '\\', we necessarily are looking for an escape
	// character.
	cut(alt((
		parse_one_char_of::<false>(SPECIAL_CHARACTERS).map(Literals::Single),
		parse_standard_escape,
	))
	// Outside of the `alt` since the error starts at the original input.
	.or(|_| Err(PatternErrorKind::InvalidEscape.error(original_input))))
	.parse(input)
}

fn parse_one_char_of<'a, const NEGATE: bool>(
	any: &'static str,
) -> impl Parser<&'a str, Output = char, Error = PatternParsingError<'a>> {
	move |input: &'a str| {
		let mut chars: Chars<'_> = input.chars();

		if let Some(ch) = chars.next() {
			if any.contains(ch) {
				if !NEGATE {
					return Ok((chars.as_str(), ch));
				} else {
					return Err(PatternErrorKind::ExpectedOneOf {
						characters: any,
						negate: NEGATE,
					}
					.error(input));
				}
			} else if NEGATE {
				return Ok((chars.as_str(), ch));
			}
		}

		Err(PatternErrorKind::ExpectedOneOf {
			characters: any,
			negate: NEGATE,
		}
		.error(input))
	}
}

fn parse_standard_escape(input: &str) -> ParsingResult<'_, Literals> {
	let mut chars: Chars<'_> = input.chars();

	// NUL stands in for end of input; it's not a valid escape character and
	// falls to the default branch below.
	let ch: char = chars.next().unwrap_or('\0');

	let unescaped: char = match ch {
		't' => '\t',
		'r' => '\r',
		'n' => '\n',
		'u' => {
			return combinator_surrounded_cut::<'{', '}', _, _>(parse_hex_code_point)
				.map(Literals::Single)
				.parse(chars.as_str());
		},
		'd' | 's' | 'w' | 'D' | 'S' | 'W' => {
			let ch_lowered: char = ch.to_ascii_lowercase();
			return Ok((
				chars.as_str(),
				Literals::Class {
					negated: ch != ch_lowered,
					items: match ch_lowered {
						'd' => vec![('0', '9')],
						's' => vec![(' ', ' '), ('\t', '\t'), ('\r', '\r'), ('\n', '\n')],
						'w' => vec![('0', '9'), ('a', 'z'), ('A', 'Z')],
						_ => {
							unreachable!();
						},
					},
				},
			));
		},
		_ => {
			return Err(PatternErrorKind::InvalidEscape.error(input));
		},
	};

	Ok((chars.as_str(), Literals::Single(unescaped)))
}

fn parse_char<const CHAR: char>(input: &str) -> ParsingResult<'_, char> {
	let mut chars: Chars<'_> = input.chars();

	if let Some(ch) = chars.next() {
		if ch == CHAR {
			return Ok((chars.as_str(), ch));
		} else {
			return Err(PatternErrorKind::ExpectedChar(CHAR).error(input));
		}
	}

	Err(PatternErrorKind::ExpectedChar(CHAR).error(input))
}

// =======================================

fn parse_digits(input: &str) -> ParsingResult<'_, u32> {
	use nom::character::complete::digit1;

	match digit1::<&str, PatternParsingError<'_>>(input) {
		Ok((remaining, lexeme)) => match lexeme.parse::<u32>() {
			Ok(n) => Ok((remaining, n)),
			Err(_) => Err(NomErr::Error(PatternParsingError::new(
				input,
				PatternErrorKind::NumberTooBig,
			))),
		},
		Err(err @ NomErr::Incomplete(_)) => Err(err),
		Err(NomErr::Error(_) | NomErr::Failure(_)) => Err(NomErr::Error(PatternParsingError::new(
			input,
			PatternErrorKind::ExpectedDecimalDigits,
		))),
	}
}

fn parse_hex_code_point(input: &str) -> ParsingResult<'_, char> {
	use nom::multi::fold_many_m_n;

	const MAX_PAIRS_PER_CODE_POINT: usize = ((char::MAX as u32).ilog2() as usize) / 8 + 1;

	let (remaining, code_point): (&str, u32) = fold_many_m_n(
		1,
		MAX_PAIRS_PER_CODE_POINT,
		parse_hex_digit_pair,
		|| 0,
		|folded, b| (folded << u8::BITS) | b,
	)
	.parse(input)
	.map_err(|_| PatternErrorKind::ExpectedHexDigits.error(input))?;

	if let Some(ch) = char::from_u32(code_point) {
		Ok((remaining, ch))
	} else {
		Err(PatternErrorKind::InvalidCodePoint(code_point).error(input))
	}
}

fn parse_hex_digit_pair(input: &str) -> ParsingResult<'_, u32> {
	let mut chars: Chars<'_> = input.chars();

	if let Some(upper) = chars.next() {
		if let Some(lower) = chars.next() {
			if let (Some(upper), Some(lower)) = (upper.to_digit(16), lower.to_digit(16)) {
				return Ok((chars.as_str(), (upper << 4) + lower));
			}
		}
	}

	Err(PatternErrorKind::ExpectedHexDigits.error(input))
}

// ==================================

fn combinator_surrounded_cut<'a, const OPEN: char, const CLOSE: char, O, F>(
	mut inside: F,
) -> impl Parser<&'a str, Output = O, Error = PatternParsingError<'a>>
where
	F: Parser<&'a str, Output = O, Error = PatternParsingError<'a>>,
{
	use nom::combinator::cut;

	move |input| {
		let (input, _): (&str, char) = parse_char::<OPEN>(input)?;

		let (input, output): (&str, O) = match inside.parse(input) {
			Ok(ok) => ok,
			Err(err @ NomErr::Incomplete(_)) => {
				return Err(err);
			},
			Err(NomErr::Error(err) | NomErr::Failure(err)) => {
				// We already matched the opening character, so the inside
				// must match too; fold `Error` ("something else may match")
				// into `Failure` ("input is malformed") and keep the
				// inside's message.
				return Err(NomErr::Failure(err));
			},
		};

		let (input, _): (&str, char) =
			cut(parse_char::<CLOSE>.or(PatternErrorKind::MissingClose(OPEN, CLOSE).diagnostic())).parse(input)?;

		Ok((input, output))
	}
}

/// The canonical set for a bracket group; the parser has already validated
/// every range.
fn class_cset(negated: bool, items: &[(char, char)]) -> CharSet {
	let mut ranges: Vec<Range> = Vec::new();
	for &(start, end) in items.iter() {
		charset::add_range(&mut ranges, u32::from(start), u32::from(end), None, None);
	}
	let cset: CharSet = CharSet::from_ranges(ranges);
	if negated { cset.invert() } else { cset }
}

fn dot_cset() -> CharSet {
	let newline: Vec<Range> = vec![Range::new(u32::from('\n'), u32::from('\n'))];
	CharSet::from_ranges(charset::invert(&newline))
}
