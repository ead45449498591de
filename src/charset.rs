use std::cell::Cell;
use std::cmp::Ordering;

use crate::prioq::PrioQ;

pub const MIN_CHAR: u32 = 0;
pub const MAX_CHAR: u32 = 0x10ffff;
/// Number of code points in the full set.
pub const FULL_LENGTH: usize = (MAX_CHAR - MIN_CHAR + 1) as usize;

const MIN_GRAPH: u32 = 0x21;
const MAX_GRAPH: u32 = 0x7e;
/// Characters that need a backslash inside a bracket expression.
const ESCAPED: &str = r"\-]^[";

/// A closed interval of code points; `start <= end`.
#[derive(Debug, Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Range {
	start: u32,
	end: u32,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CharSetError {
	/// A code point outside `[MIN_CHAR, MAX_CHAR]`.
	InvalidCodePoint(u32),
	/// A range whose start is past its end.
	InvalidRange(u32, u32),
	/// A search bound outside the range list.
	BadBound { lo: usize, hi: usize, len: usize },
	/// `remove` of a code point that is not a member.
	Missing(u32),
	/// `pop` on an empty set.
	Empty,
}

impl Range {
	pub fn new(start: u32, end: u32) -> Self {
		assert!(start <= end);
		assert!(end <= MAX_CHAR);
		Self { start, end }
	}

	pub fn try_new(start: u32, end: u32) -> Result<Self, CharSetError> {
		if start > MAX_CHAR {
			return Err(CharSetError::InvalidCodePoint(start));
		}
		if end > MAX_CHAR {
			return Err(CharSetError::InvalidCodePoint(end));
		}
		if start > end {
			return Err(CharSetError::InvalidRange(start, end));
		}
		Ok(Self { start, end })
	}

	pub fn start(&self) -> u32 {
		self.start
	}

	pub fn end(&self) -> u32 {
		self.end
	}

	pub fn len(&self) -> usize {
		(self.end - self.start + 1) as usize
	}

	fn contains(&self, item: u32) -> bool {
		self.start <= item && item <= self.end
	}
}

/// Quote a single code point the way it would appear in a bracket
/// expression: printable graph characters stand for themselves (escaped when
/// they collide with bracket syntax), control characters use their short
/// escapes, and everything else falls back to hex escapes sized to the code
/// point.
fn qchar(cp: u32) -> String {
	match cp {
		0x00 => r"\0".to_owned(),
		0x07 => r"\a".to_owned(),
		0x08 => r"\b".to_owned(),
		0x09 => r"\t".to_owned(),
		0x0a => r"\n".to_owned(),
		0x0b => r"\v".to_owned(),
		0x0c => r"\f".to_owned(),
		0x0d => r"\r".to_owned(),
		0x1b => r"\e".to_owned(),
		MIN_GRAPH..=MAX_GRAPH => {
			let ch: char = char::from(cp as u8);
			if ESCAPED.contains(ch) {
				format!("\\{ch}")
			} else {
				ch.to_string()
			}
		},
		_ if cp <= 0xff => format!("\\x{cp:02x}"),
		_ if cp <= 0xffff => format!("\\u{cp:04x}"),
		_ => format!("\\U{cp:08x}"),
	}
}

impl std::fmt::Display for Range {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.start == self.end {
			fmt.write_str(&qchar(self.start))
		} else if self.end == self.start + 1 {
			// A two-point range collapses; the dash would cost as much.
			write!(fmt, "{}{}", qchar(self.start), qchar(self.end))
		} else {
			write!(fmt, "{}-{}", qchar(self.start), qchar(self.end))
		}
	}
}

// ==================================
// Range-list algebra. All functions below maintain the canonical form:
// sorted, and neighbouring ranges separated by at least one code point.

fn invariants(ranges: &[Range]) {
	let mut maybe_previous: Option<u32> = None;
	for rng in ranges.iter() {
		assert!(rng.start <= rng.end);
		if let Some(previous) = maybe_previous {
			assert!(previous + 1 < rng.start);
		}
		maybe_previous = Some(rng.end);
	}
}

fn bisect(ranges: &[Range], item: u32, lo: usize, hi: usize) -> (usize, bool) {
	let mut lo: usize = lo;
	let mut hi: usize = hi;
	while lo < hi {
		let mid: usize = (lo + hi) / 2;
		if ranges[mid].contains(item) {
			return (mid, true);
		} else if item < ranges[mid].start {
			hi = mid;
		} else {
			lo = mid + 1;
		}
	}
	(lo, false)
}

/// Binary search over a canonical range list. Returns the index of the range
/// containing `item`, or the insertion index for a new range, along with a
/// containment flag. `lo`/`hi` restrict the searched slice.
pub fn search_ranges(
	ranges: &[Range],
	item: u32,
	lo: Option<usize>,
	hi: Option<usize>,
) -> Result<(usize, bool), CharSetError> {
	let lo: usize = lo.unwrap_or(0);
	let hi: usize = hi.unwrap_or(ranges.len());
	if lo > ranges.len() || hi > ranges.len() || lo > hi {
		return Err(CharSetError::BadBound {
			lo,
			hi,
			len: ranges.len(),
		});
	}
	Ok(bisect(ranges, item, lo, hi))
}

/// Add `[start, end]` to a canonical range list, merging with any contained,
/// overlapped, or adjacent neighbours. The hints are `(index, contained)`
/// pairs previously computed by [`search_ranges`] for `start` and `end`.
pub fn add_range(
	ranges: &mut Vec<Range>,
	start: u32,
	end: u32,
	lo_hint: Option<(usize, bool)>,
	hi_hint: Option<(usize, bool)>,
) {
	assert!(start <= end);
	let (lo_idx, lo_contained): (usize, bool) =
		lo_hint.unwrap_or_else(|| bisect(ranges, start, 0, ranges.len()));
	let (hi_idx, hi_contained): (usize, bool) =
		hi_hint.unwrap_or_else(|| bisect(ranges, end, 0, ranges.len()));

	let mut remove_lo: usize = lo_idx;
	let mut new_start: u32 = if lo_contained { ranges[lo_idx].start } else { start };
	if !lo_contained && lo_idx > 0 && ranges[lo_idx - 1].end + 1 == start {
		// Adjacent on the left; swallow the neighbour.
		remove_lo = lo_idx - 1;
		new_start = ranges[remove_lo].start;
	}

	let mut remove_hi: usize = if hi_contained { hi_idx + 1 } else { hi_idx };
	let mut new_end: u32 = if hi_contained { ranges[hi_idx].end } else { end };
	if !hi_contained && hi_idx < ranges.len() && end + 1 == ranges[hi_idx].start {
		new_end = ranges[hi_idx].end;
		remove_hi = hi_idx + 1;
	}

	ranges.splice(remove_lo..remove_hi, [Range::new(new_start, new_end)]);
}

/// Remove `[start, end]` from a canonical range list, splitting any range it
/// intersects. Hints as for [`add_range`].
pub fn discard_range(
	ranges: &mut Vec<Range>,
	start: u32,
	end: u32,
	lo_hint: Option<(usize, bool)>,
	hi_hint: Option<(usize, bool)>,
) {
	assert!(start <= end);
	let (lo_idx, lo_contained): (usize, bool) =
		lo_hint.unwrap_or_else(|| bisect(ranges, start, 0, ranges.len()));
	let (hi_idx, hi_contained): (usize, bool) =
		hi_hint.unwrap_or_else(|| bisect(ranges, end, 0, ranges.len()));

	let left: Option<Range> = (lo_contained && ranges[lo_idx].start < start)
		.then(|| Range::new(ranges[lo_idx].start, start - 1));
	let right: Option<Range> =
		(hi_contained && end < ranges[hi_idx].end).then(|| Range::new(end + 1, ranges[hi_idx].end));

	let remove_hi: usize = if hi_contained { hi_idx + 1 } else { hi_idx };
	ranges.splice(lo_idx..remove_hi, left.into_iter().chain(right));
}

/// Complement within `[MIN_CHAR, MAX_CHAR]`.
pub fn invert(ranges: &[Range]) -> Vec<Range> {
	let mut complement: Vec<Range> = Vec::new();

	let mut pos: u32 = MIN_CHAR;
	for rng in ranges.iter() {
		if pos < rng.start {
			complement.push(Range::new(pos, rng.start - 1));
		}
		if rng.end < MAX_CHAR {
			pos = rng.end + 1;
		} else {
			return complement;
		}
	}

	complement.push(Range::new(pos, MAX_CHAR));
	complement
}

pub fn union(a: &[Range], b: &[Range]) -> Vec<Range> {
	// Iterate the shorter list against a copy of the longer one.
	let (shorter, longer): (&[Range], &[Range]) = if a.len() <= b.len() { (a, b) } else { (b, a) };
	let mut result: Vec<Range> = longer.to_vec();
	for rng in shorter.iter() {
		add_range(&mut result, rng.start, rng.end, None, None);
	}
	result
}

/// `a` minus `b`.
pub fn difference(a: &[Range], b: &[Range]) -> Vec<Range> {
	let mut result: Vec<Range> = a.to_vec();
	for rng in b.iter() {
		discard_range(&mut result, rng.start, rng.end, None, None);
	}
	result
}

pub fn intersection(a: &[Range], b: &[Range]) -> Vec<Range> {
	let (shorter, longer): (&[Range], &[Range]) = if a.len() <= b.len() { (a, b) } else { (b, a) };
	difference(longer, &invert(shorter))
}

pub fn sym_difference(a: &[Range], b: &[Range]) -> Vec<Range> {
	difference(&union(a, b), &intersection(a, b))
}

pub fn is_disjoint(a: &[Range], b: &[Range]) -> bool {
	let (shorter, longer): (&[Range], &[Range]) = if a.len() <= b.len() { (a, b) } else { (b, a) };
	for rng in shorter.iter() {
		let (idx, contained): (usize, bool) = bisect(longer, rng.start, 0, longer.len());
		if contained {
			return false;
		}
		if idx < longer.len() && longer[idx].start <= rng.end {
			return false;
		}
	}
	true
}

/// Every range of `a` must sit inside a single range of `b`.
pub fn is_subset(a: &[Range], b: &[Range]) -> bool {
	for rng in a.iter() {
		let (idx, contained): (usize, bool) = bisect(b, rng.start, 0, b.len());
		if !contained || b[idx].end < rng.end {
			return false;
		}
	}
	true
}

fn total_len(ranges: &[Range]) -> usize {
	ranges.iter().map(Range::len).sum()
}

fn fmt_ranges(ranges: &[Range], fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
	let length: usize = total_len(ranges);
	if length == 0 {
		return fmt.write_str("[]");
	}
	if length == FULL_LENGTH {
		return fmt.write_str("[^]");
	}
	if length == FULL_LENGTH - 1 && !bisect(ranges, u32::from('\n'), 0, ranges.len()).1 {
		return fmt.write_str(".");
	}
	if length > FULL_LENGTH / 2 {
		// The exclusion form is shorter once the set covers more than half
		// of code-point space.
		fmt.write_str("[^")?;
		for rng in invert(ranges).iter() {
			write!(fmt, "{rng}")?;
		}
		fmt.write_str("]")
	} else {
		fmt.write_str("[")?;
		for rng in ranges.iter() {
			write!(fmt, "{rng}")?;
		}
		fmt.write_str("]")
	}
}

// ==================================

/// A mutable set of code points stored as sorted, non-adjacent ranges.
#[derive(Debug, Clone)]
pub struct CharSet {
	ranges: Vec<Range>,
	/// Cached element count; cleared on every mutation.
	len_cache: Cell<Option<usize>>,
}

/// An immutable counterpart of [`CharSet`]; hashable, usable as a map key.
/// Its `Ord` is the lexicographic map-key order of the range list, not set
/// inclusion.
#[derive(Debug, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FrozenCharSet {
	ranges: Vec<Range>,
}

/// Conversions accepted wherever a character set is constructed: a single
/// `char` or code point, an endpoint pair, a [`Range`], a string of members,
/// or an existing set.
pub trait IntoCharSet {
	fn into_charset(self) -> Result<CharSet, CharSetError>;
}

impl CharSet {
	pub fn new() -> Self {
		Self {
			ranges: Vec::new(),
			len_cache: Cell::new(None),
		}
	}

	/// The inclusive range `[start, end]` as a one-range set.
	pub fn range<Lo, Hi>(start: Lo, end: Hi) -> Result<Self, CharSetError>
	where
		Lo: Into<u32>,
		Hi: Into<u32>,
	{
		let rng: Range = Range::try_new(start.into(), end.into())?;
		Ok(Self::from_ranges(vec![rng]))
	}

	pub fn of(item: impl IntoCharSet) -> Result<Self, CharSetError> {
		item.into_charset()
	}

	/// Low-level bypass for callers holding an already-canonical range list.
	pub fn from_ranges(ranges: Vec<Range>) -> Self {
		invariants(&ranges);
		Self {
			ranges,
			len_cache: Cell::new(None),
		}
	}

	pub fn from_items<Items, Item>(items: Items) -> Result<Self, CharSetError>
	where
		Items: IntoIterator<Item = Item>,
		Item: Into<u32>,
	{
		let mut cset: Self = Self::new();
		for item in items.into_iter() {
			cset.add(item)?;
		}
		Ok(cset)
	}

	pub fn ranges(&self) -> &[Range] {
		&self.ranges
	}

	pub fn len(&self) -> usize {
		if let Some(cached) = self.len_cache.get() {
			return cached;
		}
		let length: usize = total_len(&self.ranges);
		self.len_cache.set(Some(length));
		length
	}

	pub fn is_empty(&self) -> bool {
		self.ranges.is_empty()
	}

	pub fn contains(&self, item: impl Into<u32>) -> bool {
		bisect(&self.ranges, item.into(), 0, self.ranges.len()).1
	}

	/// Iterate the member code points in ascending order. Members are code
	/// points, not `char`s; the set may hold surrogates.
	pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
		self.ranges.iter().flat_map(|rng| rng.start..=rng.end)
	}

	pub fn add(&mut self, item: impl Into<u32>) -> Result<(), CharSetError> {
		let item: u32 = item.into();
		if item > MAX_CHAR {
			return Err(CharSetError::InvalidCodePoint(item));
		}
		let hint: (usize, bool) = bisect(&self.ranges, item, 0, self.ranges.len());
		if hint.1 {
			return Ok(());
		}
		add_range(&mut self.ranges, item, item, Some(hint), Some(hint));
		self.len_cache.set(None);
		Ok(())
	}

	/// Remove `item` if present; absent items are not an error.
	pub fn discard(&mut self, item: impl Into<u32>) -> Result<(), CharSetError> {
		let item: u32 = item.into();
		if item > MAX_CHAR {
			return Err(CharSetError::InvalidCodePoint(item));
		}
		let hint: (usize, bool) = bisect(&self.ranges, item, 0, self.ranges.len());
		if !hint.1 {
			return Ok(());
		}
		discard_range(&mut self.ranges, item, item, Some(hint), Some(hint));
		self.len_cache.set(None);
		Ok(())
	}

	/// Remove `item`; fails when it is not a member.
	pub fn remove(&mut self, item: impl Into<u32>) -> Result<(), CharSetError> {
		let item: u32 = item.into();
		if item > MAX_CHAR {
			return Err(CharSetError::InvalidCodePoint(item));
		}
		let hint: (usize, bool) = bisect(&self.ranges, item, 0, self.ranges.len());
		if !hint.1 {
			return Err(CharSetError::Missing(item));
		}
		discard_range(&mut self.ranges, item, item, Some(hint), Some(hint));
		self.len_cache.set(None);
		Ok(())
	}

	/// Remove and return the lowest member.
	pub fn pop(&mut self) -> Result<u32, CharSetError> {
		let lowest: u32 = match self.ranges.first() {
			Some(rng) => rng.start,
			None => {
				return Err(CharSetError::Empty);
			},
		};
		discard_range(&mut self.ranges, lowest, lowest, Some((0, true)), Some((0, true)));
		self.len_cache.set(None);
		Ok(lowest)
	}

	pub fn clear(&mut self) {
		self.ranges.clear();
		self.len_cache.set(None);
	}

	pub fn add_range(&mut self, start: impl Into<u32>, end: impl Into<u32>) -> Result<(), CharSetError> {
		let rng: Range = Range::try_new(start.into(), end.into())?;
		add_range(&mut self.ranges, rng.start, rng.end, None, None);
		self.len_cache.set(None);
		Ok(())
	}

	pub fn discard_range(&mut self, start: impl Into<u32>, end: impl Into<u32>) -> Result<(), CharSetError> {
		let rng: Range = Range::try_new(start.into(), end.into())?;
		discard_range(&mut self.ranges, rng.start, rng.end, None, None);
		self.len_cache.set(None);
		Ok(())
	}

	pub fn invert(&self) -> Self {
		Self::from_ranges(invert(&self.ranges))
	}

	pub fn intersection(&self, other: &Self) -> Self {
		Self::from_ranges(intersection(&self.ranges, &other.ranges))
	}

	pub fn union(&self, other: &Self) -> Self {
		Self::from_ranges(union(&self.ranges, &other.ranges))
	}

	pub fn difference(&self, other: &Self) -> Self {
		Self::from_ranges(difference(&self.ranges, &other.ranges))
	}

	pub fn sym_difference(&self, other: &Self) -> Self {
		Self::from_ranges(sym_difference(&self.ranges, &other.ranges))
	}

	pub fn is_disjoint(&self, other: &Self) -> bool {
		is_disjoint(&self.ranges, &other.ranges)
	}

	pub fn is_subset(&self, other: &Self) -> bool {
		is_subset(&self.ranges, &other.ranges)
	}

	pub fn is_superset(&self, other: &Self) -> bool {
		is_subset(&other.ranges, &self.ranges)
	}

	pub fn freeze(self) -> FrozenCharSet {
		FrozenCharSet { ranges: self.ranges }
	}

	/// Decompose a family of possibly-overlapping sets into single-range
	/// sets that are pairwise disjoint and cover the family's union. Each
	/// produced set is paired with the (sorted) indices of the inputs that
	/// wholly contain it.
	pub fn disjoint<'a, Sets>(csets: Sets) -> Disjoint
	where
		Sets: IntoIterator<Item = &'a CharSet>,
	{
		let mut entries: Vec<(Range, Vec<usize>)> = Vec::new();
		for (i, cset) in csets.into_iter().enumerate() {
			for &rng in cset.ranges.iter() {
				entries.push((rng, vec![i]));
			}
		}
		Disjoint {
			queue: PrioQ::with_items(entries, disjoint_key as fn(&DisjointEntry) -> (u32, u32)),
		}
	}
}

type DisjointEntry = (Range, Vec<usize>);

fn disjoint_key(entry: &DisjointEntry) -> (u32, u32) {
	// Ascending start, then ascending length: among entries sharing a start
	// point, anything popped later is either a duplicate or a superset.
	(entry.0.start, entry.0.end - entry.0.start + 1)
}

/// Lazy sequence produced by [`CharSet::disjoint`].
pub struct Disjoint {
	queue: PrioQ<DisjointEntry, (u32, u32), fn(&DisjointEntry) -> (u32, u32)>,
}

impl Iterator for Disjoint {
	type Item = (CharSet, Vec<usize>);

	fn next(&mut self) -> Option<Self::Item> {
		let (rng, mut owners): DisjointEntry = self.queue.pop()?;

		// Collapse duplicate ranges, merging their owner lists.
		loop {
			let duplicate: bool = self.queue.top().is_some_and(|(top, _)| *top == rng);
			if !duplicate {
				break;
			}
			if let Some((_, more)) = self.queue.pop() {
				owners.extend(more);
			}
		}

		let start: u32 = rng.start;
		let mut end: u32 = rng.end;

		let mut full_owners: Vec<usize> = owners.clone();
		let mut supersets: Vec<DisjointEntry> = Vec::new();
		loop {
			let top_start: u32 = match self.queue.top() {
				Some((top, _)) => top.start,
				None => {
					break;
				},
			};
			if top_start <= start {
				// A superset of the prefix being produced.
				if let Some(entry) = self.queue.pop() {
					full_owners.extend(entry.1.iter().copied());
					supersets.push(entry);
				}
			} else {
				if top_start <= end {
					// Overlaps without sharing our start; clamp.
					end = top_start - 1;
				}
				break;
			}
		}

		let produced: CharSet = CharSet::from_ranges(vec![Range::new(start, end)]);

		// Push the superset tails and any unconsumed remainder back.
		let split_at: u32 = end + 1;
		let tails: Vec<DisjointEntry> = supersets
			.into_iter()
			.map(|(superset, sowners)| (Range::new(split_at, superset.end), sowners))
			.collect::<Vec<_>>();
		self.queue.push(tails);
		if end < rng.end {
			self.queue.push([(Range::new(split_at, rng.end), owners)]);
		}

		full_owners.sort_unstable();
		full_owners.dedup();
		Some((produced, full_owners))
	}
}

impl FrozenCharSet {
	pub fn new(src: impl IntoCharSet) -> Result<Self, CharSetError> {
		Ok(src.into_charset()?.freeze())
	}

	pub fn ranges(&self) -> &[Range] {
		&self.ranges
	}

	pub fn len(&self) -> usize {
		total_len(&self.ranges)
	}

	pub fn is_empty(&self) -> bool {
		self.ranges.is_empty()
	}

	pub fn contains(&self, item: impl Into<u32>) -> bool {
		bisect(&self.ranges, item.into(), 0, self.ranges.len()).1
	}

	pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
		self.ranges.iter().flat_map(|rng| rng.start..=rng.end)
	}

	pub fn thaw(self) -> CharSet {
		CharSet::from_ranges(self.ranges)
	}
}

impl From<CharSet> for FrozenCharSet {
	fn from(cset: CharSet) -> Self {
		cset.freeze()
	}
}

impl From<FrozenCharSet> for CharSet {
	fn from(cset: FrozenCharSet) -> Self {
		cset.thaw()
	}
}

impl PartialEq for CharSet {
	fn eq(&self, other: &Self) -> bool {
		self.ranges == other.ranges
	}
}

impl Eq for CharSet {}

/// The subset lattice: `a < b` iff `a` is a proper subset of `b`.
/// Incomparable sets return `None`.
impl PartialOrd for CharSet {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		match (self.is_subset(other), other.is_subset(self)) {
			(true, true) => Some(Ordering::Equal),
			(true, false) => Some(Ordering::Less),
			(false, true) => Some(Ordering::Greater),
			(false, false) => None,
		}
	}
}

impl std::fmt::Display for CharSet {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		fmt_ranges(&self.ranges, fmt)
	}
}

impl std::fmt::Display for FrozenCharSet {
	fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		fmt_ranges(&self.ranges, fmt)
	}
}

impl FromIterator<char> for CharSet {
	fn from_iter<Items: IntoIterator<Item = char>>(items: Items) -> Self {
		let mut cset: Self = Self::new();
		for ch in items.into_iter() {
			// `char` is always a valid code point.
			let _ = cset.add(ch);
		}
		cset
	}
}

macro_rules! binop_impl {
	($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $op:ident) => {
		impl std::ops::$trait for &CharSet {
			type Output = CharSet;

			fn $method(self, other: &CharSet) -> CharSet {
				CharSet::from_ranges($op(&self.ranges, &other.ranges))
			}
		}

		impl std::ops::$assign_trait<&CharSet> for CharSet {
			fn $assign_method(&mut self, other: &CharSet) {
				self.ranges = $op(&self.ranges, &other.ranges);
				self.len_cache.set(None);
			}
		}
	};
}

binop_impl!(BitAnd, bitand, BitAndAssign, bitand_assign, intersection);
binop_impl!(BitOr, bitor, BitOrAssign, bitor_assign, union);
binop_impl!(Sub, sub, SubAssign, sub_assign, difference);
binop_impl!(BitXor, bitxor, BitXorAssign, bitxor_assign, sym_difference);

impl std::ops::Not for &CharSet {
	type Output = CharSet;

	fn not(self) -> CharSet {
		self.invert()
	}
}

impl IntoCharSet for CharSet {
	fn into_charset(self) -> Result<CharSet, CharSetError> {
		Ok(self)
	}
}

impl IntoCharSet for &CharSet {
	fn into_charset(self) -> Result<CharSet, CharSetError> {
		Ok(self.clone())
	}
}

impl IntoCharSet for &FrozenCharSet {
	fn into_charset(self) -> Result<CharSet, CharSetError> {
		Ok(CharSet::from_ranges(self.ranges.clone()))
	}
}

impl IntoCharSet for char {
	fn into_charset(self) -> Result<CharSet, CharSetError> {
		CharSet::range(self, self)
	}
}

impl IntoCharSet for u32 {
	fn into_charset(self) -> Result<CharSet, CharSetError> {
		CharSet::range(self, self)
	}
}

impl IntoCharSet for (char, char) {
	fn into_charset(self) -> Result<CharSet, CharSetError> {
		CharSet::range(self.0, self.1)
	}
}

impl IntoCharSet for (u32, u32) {
	fn into_charset(self) -> Result<CharSet, CharSetError> {
		CharSet::range(self.0, self.1)
	}
}

impl IntoCharSet for Range {
	fn into_charset(self) -> Result<CharSet, CharSetError> {
		Ok(CharSet::from_ranges(vec![self]))
	}
}

impl IntoCharSet for &str {
	fn into_charset(self) -> Result<CharSet, CharSetError> {
		Ok(self.chars().collect::<CharSet>())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn ranges(pairs: &[(u32, u32)]) -> Vec<Range> {
		pairs.iter().map(|&(s, e)| Range::new(s, e)).collect::<Vec<_>>()
	}

	#[test]
	fn qchar_forms() {
		assert_eq!(qchar(u32::from('a')), "a");
		assert_eq!(qchar(u32::from('-')), "\\-");
		assert_eq!(qchar(u32::from(']')), "\\]");
		assert_eq!(qchar(0x00), "\\0");
		assert_eq!(qchar(0x09), "\\t");
		assert_eq!(qchar(0x1b), "\\e");
		assert_eq!(qchar(0x0f), "\\x0f");
		assert_eq!(qchar(0x01ff), "\\u01ff");
		assert_eq!(qchar(0x0001ffff), "\\U0001ffff");
	}

	#[test]
	fn range_display() {
		assert_eq!(Range::new(0x7f, 0x7f).to_string(), "\\x7f");
		assert_eq!(Range::new(0x7f, 0x80).to_string(), "\\x7f\\x80");
		assert_eq!(Range::new(0x7f, 0x81).to_string(), "\\x7f-\\x81");
	}

	#[test]
	fn search_empty() {
		assert_eq!(search_ranges(&[], 97, None, None), Ok((0, false)));
	}

	#[test]
	fn search_contained() {
		let ranges: Vec<Range> = ranges(&[(97, 99), (8230, 8232), (10052, 10054)]);

		assert_eq!(search_ranges(&ranges, 98, None, None), Ok((0, true)));
		assert_eq!(search_ranges(&ranges, 8231, None, None), Ok((1, true)));
		assert_eq!(search_ranges(&ranges, 8230, None, None), Ok((1, true)));
		assert_eq!(search_ranges(&ranges, 8232, None, None), Ok((1, true)));
		assert_eq!(search_ranges(&ranges, 10053, None, None), Ok((2, true)));
	}

	#[test]
	fn search_uncontained() {
		let ranges: Vec<Range> = ranges(&[(97, 99), (8230, 8232), (10052, 10054)]);

		assert_eq!(search_ranges(&ranges, 50, None, None), Ok((0, false)));
		assert_eq!(search_ranges(&ranges, 5000, None, None), Ok((1, false)));
		assert_eq!(search_ranges(&ranges, 20000, None, None), Ok((3, false)));
	}

	#[test]
	fn search_bounds() {
		let ranges: Vec<Range> = ranges(&[(97, 99), (8230, 8232), (10052, 10054)]);

		// Constrained away from the containing range.
		assert_eq!(search_ranges(&ranges, 98, Some(1), None), Ok((1, false)));
		assert_eq!(search_ranges(&ranges, 10053, None, Some(2)), Ok((2, false)));
		assert_eq!(
			search_ranges(&ranges, 98, Some(4), None),
			Err(CharSetError::BadBound { lo: 4, hi: 3, len: 3 })
		);
		assert_eq!(
			search_ranges(&ranges, 98, None, Some(9)),
			Err(CharSetError::BadBound { lo: 0, hi: 9, len: 3 })
		);
	}

	#[test]
	fn add_range_contained() {
		let mut r: Vec<Range> = ranges(&[(97, 122)]);
		add_range(&mut r, 98, 121, None, None);
		assert_eq!(r, ranges(&[(97, 122)]));
	}

	#[test]
	fn add_range_disjoint() {
		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 97, 98, None, None);
		assert_eq!(r, ranges(&[(97, 98), (100, 102), (110, 112)]));

		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 104, 108, None, None);
		assert_eq!(r, ranges(&[(100, 102), (104, 108), (110, 112)]));

		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 114, 118, None, None);
		assert_eq!(r, ranges(&[(100, 102), (110, 112), (114, 118)]));
	}

	#[test]
	fn add_range_mergable_left() {
		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 97, 99, None, None);
		assert_eq!(r, ranges(&[(97, 102), (110, 112)]));

		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 97, 101, None, None);
		assert_eq!(r, ranges(&[(97, 102), (110, 112)]));

		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 97, 103, None, None);
		assert_eq!(r, ranges(&[(97, 103), (110, 112)]));
	}

	#[test]
	fn add_range_mergable_right() {
		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 103, 106, None, None);
		assert_eq!(r, ranges(&[(100, 106), (110, 112)]));

		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 101, 106, None, None);
		assert_eq!(r, ranges(&[(100, 106), (110, 112)]));

		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 99, 106, None, None);
		assert_eq!(r, ranges(&[(99, 106), (110, 112)]));
	}

	#[test]
	fn add_range_mergable_span() {
		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 103, 109, None, None);
		assert_eq!(r, ranges(&[(100, 112)]));

		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 101, 111, None, None);
		assert_eq!(r, ranges(&[(100, 112)]));

		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 99, 113, None, None);
		assert_eq!(r, ranges(&[(99, 113)]));
	}

	#[test]
	fn add_range_hints() {
		let mut r: Vec<Range> = ranges(&[(100, 102), (110, 112)]);
		add_range(&mut r, 101, 111, Some((0, true)), Some((1, true)));
		assert_eq!(r, ranges(&[(100, 112)]));
	}

	#[test]
	fn discard_range_uncontained() {
		let mut r: Vec<Range> = ranges(&[(97, 104), (110, 118)]);
		discard_range(&mut r, 105, 109, None, None);
		assert_eq!(r, ranges(&[(97, 104), (110, 118)]));
	}

	#[test]
	fn discard_range_split_left() {
		let mut r: Vec<Range> = ranges(&[(97, 104), (108, 112), (118, 122)]);
		discard_range(&mut r, 95, 102, None, None);
		assert_eq!(r, ranges(&[(103, 104), (108, 112), (118, 122)]));

		let mut r: Vec<Range> = ranges(&[(97, 104), (108, 112), (118, 122)]);
		discard_range(&mut r, 95, 104, None, None);
		assert_eq!(r, ranges(&[(108, 112), (118, 122)]));
	}

	#[test]
	fn discard_range_split_right() {
		let mut r: Vec<Range> = ranges(&[(97, 104), (108, 112), (118, 122)]);
		discard_range(&mut r, 102, 106, None, None);
		assert_eq!(r, ranges(&[(97, 101), (108, 112), (118, 122)]));

		let mut r: Vec<Range> = ranges(&[(97, 104), (108, 112), (118, 122)]);
		discard_range(&mut r, 97, 106, None, None);
		assert_eq!(r, ranges(&[(108, 112), (118, 122)]));
	}

	#[test]
	fn discard_range_span() {
		let mut r: Vec<Range> = ranges(&[(97, 104), (108, 112), (118, 122)]);
		discard_range(&mut r, 95, 106, None, None);
		assert_eq!(r, ranges(&[(108, 112), (118, 122)]));

		let mut r: Vec<Range> = ranges(&[(97, 104), (108, 112), (118, 122)]);
		discard_range(&mut r, 100, 120, None, None);
		assert_eq!(r, ranges(&[(97, 99), (121, 122)]));
	}

	#[test]
	fn discard_range_middle_splits() {
		let mut r: Vec<Range> = ranges(&[(97, 122)]);
		discard_range(&mut r, 100, 110, None, None);
		assert_eq!(r, ranges(&[(97, 99), (111, 122)]));
	}

	#[test]
	fn invert_round_trip() {
		let short: Vec<Range> = ranges(&[(97, 104), (108, 112), (118, 122)]);
		let long: Vec<Range> = ranges(&[(0, 96), (105, 107), (113, 117), (123, MAX_CHAR)]);

		assert_eq!(invert(&short), long);
		assert_eq!(invert(&long), short);
		assert_eq!(invert(&[]), ranges(&[(MIN_CHAR, MAX_CHAR)]));
		assert_eq!(invert(&ranges(&[(MIN_CHAR, MAX_CHAR)])), Vec::new());
	}

	#[test]
	fn boolean_ops() {
		let a: Vec<Range> = ranges(&[(97, 106), (111, 122)]);
		let b: Vec<Range> = ranges(&[(98, 107), (110, 115), (117, 122)]);

		let expected_and: Vec<Range> = ranges(&[(98, 106), (111, 115), (117, 122)]);
		assert_eq!(intersection(&a, &b), expected_and);
		assert_eq!(intersection(&b, &a), expected_and);

		let expected_or: Vec<Range> = ranges(&[(97, 107), (110, 122)]);
		assert_eq!(union(&a, &b), expected_or);
		assert_eq!(union(&b, &a), expected_or);

		assert_eq!(difference(&a, &b), ranges(&[(97, 97), (116, 116)]));
		assert_eq!(difference(&b, &a), ranges(&[(107, 107), (110, 110)]));

		let expected_xor: Vec<Range> = ranges(&[(97, 97), (107, 107), (110, 110), (116, 116)]);
		assert_eq!(sym_difference(&a, &b), expected_xor);
		assert_eq!(sym_difference(&b, &a), expected_xor);
	}

	#[test]
	fn disjointness() {
		let a: Vec<Range> = ranges(&[(97, 106), (111, 122)]);
		let b: Vec<Range> = ranges(&[(98, 107), (110, 115), (117, 122)]);
		let c: Vec<Range> = ranges(&[(95, 96), (107, 110), (123, 180)]);

		assert!(!is_disjoint(&a, &b));
		assert!(!is_disjoint(&b, &a));
		assert!(is_disjoint(&a, &c));
		assert!(is_disjoint(&c, &a));
	}

	#[test]
	fn point_ops() {
		let mut cset: CharSet = CharSet::new();
		cset.add('c').unwrap();
		cset.add('a').unwrap();
		cset.add('b').unwrap();
		assert_eq!(cset.ranges(), &[Range::new(97, 99)]);
		assert_eq!(cset.len(), 3);
		assert!(cset.contains('b'));
		assert!(!cset.contains('z'));

		cset.discard('b').unwrap();
		assert_eq!(cset.ranges(), &[Range::new(97, 97), Range::new(99, 99)]);
		// Discard of an absent member is silent; remove is not.
		cset.discard('b').unwrap();
		assert_eq!(cset.remove('z'), Err(CharSetError::Missing(122)));
		cset.remove('a').unwrap();
		assert_eq!(cset.pop(), Ok(99));
		assert_eq!(cset.pop(), Err(CharSetError::Empty));

		assert_eq!(cset.add(0x110000_u32), Err(CharSetError::InvalidCodePoint(0x110000)));
	}

	#[test]
	fn pop_shrinks_range() {
		let mut cset: CharSet = CharSet::range('a', 'c').unwrap();
		assert_eq!(cset.pop(), Ok(97));
		assert_eq!(cset.ranges(), &[Range::new(98, 99)]);
	}

	#[test]
	fn len_cache_cleared_on_mutation() {
		let mut cset: CharSet = CharSet::range('a', 'z').unwrap();
		assert_eq!(cset.len(), 26);
		cset.add('0').unwrap();
		assert_eq!(cset.len(), 27);
		cset.clear();
		assert_eq!(cset.len(), 0);
		assert!(cset.is_empty());
	}

	#[test]
	fn constructors() {
		assert_eq!(CharSet::range('z', 'a'), Err(CharSetError::InvalidRange(122, 97)));
		assert_eq!(
			CharSet::range(0x110000_u32, 0x110001_u32),
			Err(CharSetError::InvalidCodePoint(0x110000))
		);

		let from_str: CharSet = CharSet::of("cab").unwrap();
		assert_eq!(from_str.ranges(), &[Range::new(97, 99)]);

		let copied: CharSet = CharSet::of(&from_str).unwrap();
		assert_eq!(copied, from_str);

		let single: CharSet = CharSet::of('a').unwrap();
		assert_eq!(single.ranges(), &[Range::new(97, 97)]);
	}

	#[test]
	fn round_trip_from_ranges() {
		let mut cset: CharSet = CharSet::of("hello world").unwrap();
		cset.add_range('0', '9').unwrap();
		assert_eq!(CharSet::from_ranges(cset.ranges().to_vec()), cset);
	}

	#[test]
	fn subset_lattice() {
		let small: CharSet = CharSet::range('b', 'f').unwrap();
		let big: CharSet = CharSet::range('a', 'z').unwrap();
		let other: CharSet = CharSet::range('0', '9').unwrap();

		assert!(small.is_subset(&big));
		assert!(big.is_superset(&small));
		assert!(small < big);
		assert!(big > small);
		assert!(small <= small.clone());
		assert_eq!(small.partial_cmp(&other), None);

		// A set spanning a gap is not a subset of a split set.
		let split: CharSet = CharSet::from_ranges(vec![Range::new(97, 99), Range::new(102, 104)]);
		let spanning: CharSet = CharSet::range(98_u32, 103_u32).unwrap();
		assert!(!spanning.is_subset(&split));
		assert!(split.is_subset(&big));
	}

	#[test]
	fn display_forms() {
		assert_eq!(CharSet::new().to_string(), "[]");
		assert_eq!(CharSet::range(MIN_CHAR, MAX_CHAR).unwrap().to_string(), "[^]");

		let mut dot: CharSet = CharSet::range(MIN_CHAR, MAX_CHAR).unwrap();
		dot.remove('\n').unwrap();
		assert_eq!(dot.to_string(), ".");

		let mut not_a: CharSet = CharSet::range(MIN_CHAR, MAX_CHAR).unwrap();
		not_a.remove('a').unwrap();
		assert_eq!(not_a.to_string(), "[^a]");

		let included: CharSet = CharSet::from_ranges(vec![Range::new(97, 99), Range::new(102, 104)]);
		assert_eq!(included.to_string(), "[a-cf-h]");
	}

	#[test]
	fn operators() {
		let a: CharSet = CharSet::range('a', 'j').unwrap();
		let b: CharSet = CharSet::range('f', 'p').unwrap();

		assert_eq!(&a & &b, CharSet::range('f', 'j').unwrap());
		assert_eq!(&a | &b, CharSet::range('a', 'p').unwrap());
		assert_eq!(&a - &b, CharSet::range('a', 'e').unwrap());
		assert_eq!(
			&a ^ &b,
			CharSet::from_ranges(vec![Range::new(97, 101), Range::new(107, 112)])
		);
		assert_eq!((!&(!&a)), a);

		let mut c: CharSet = a.clone();
		c |= &b;
		assert_eq!(c, CharSet::range('a', 'p').unwrap());
		c -= &b;
		assert_eq!(c, CharSet::range('a', 'e').unwrap());
	}

	#[test]
	fn iteration_yields_members_in_order() {
		let cset: CharSet = CharSet::from_ranges(vec![Range::new(97, 99), Range::new(120, 121)]);
		assert_eq!(cset.iter().collect::<Vec<_>>(), vec![97, 98, 99, 120, 121]);
		assert_eq!(CharSet::new().iter().count(), 0);
	}

	#[test]
	fn range_op_validation() {
		let mut cset: CharSet = CharSet::new();
		assert_eq!(cset.add_range('z', 'a'), Err(CharSetError::InvalidRange(122, 97)));
		assert_eq!(
			cset.add_range(0_u32, 0x110000_u32),
			Err(CharSetError::InvalidCodePoint(0x110000))
		);
		assert_eq!(cset.discard_range('z', 'a'), Err(CharSetError::InvalidRange(122, 97)));
		assert!(cset.is_empty());

		cset.add_range('a', 'f').unwrap();
		cset.discard_range('c', 'd').unwrap();
		assert_eq!(cset.ranges(), &[Range::new(97, 98), Range::new(101, 102)]);
	}

	#[test]
	fn from_items_validates() {
		let cset: CharSet = CharSet::from_items([97_u32, 98, 99]).unwrap();
		assert_eq!(cset.ranges(), &[Range::new(97, 99)]);

		assert_eq!(
			CharSet::from_items([97_u32, 0x110000]),
			Err(CharSetError::InvalidCodePoint(0x110000))
		);
	}

	#[test]
	fn comparison_operators() {
		let small: CharSet = CharSet::range('c', 'e').unwrap();
		let big: CharSet = CharSet::range('a', 'z').unwrap();

		assert!(small <= big);
		assert!(small < big);
		assert!(big >= small);
		assert!(big > small);
		assert!(!(small < small.clone()));
		assert!(small <= small.clone());
		assert!(small == small.clone());
		assert!(small != big);
	}

	#[test]
	fn frozen_round_trip() {
		let cset: CharSet = CharSet::of("abc").unwrap();
		let frozen: FrozenCharSet = cset.clone().freeze();
		assert_eq!(frozen.len(), 3);
		assert!(frozen.contains('a'));
		assert_eq!(frozen.to_string(), "[a-c]");
		assert_eq!(frozen.clone().thaw(), cset);

		use std::collections::BTreeMap;
		let mut keyed: BTreeMap<FrozenCharSet, u32> = BTreeMap::new();
		keyed.insert(frozen.clone(), 1);
		assert_eq!(keyed.get(&frozen), Some(&1));
	}

	#[test]
	fn disjoint_decomposition() {
		let csets: Vec<CharSet> = vec![
			CharSet::range(0_u32, 5_u32).unwrap(),
			CharSet::range(0_u32, 5_u32).unwrap(),
			CharSet::range(0_u32, 3_u32).unwrap(),
			CharSet::range(2_u32, 4_u32).unwrap(),
			CharSet::range(7_u32, 9_u32).unwrap(),
		];

		let result: Vec<(CharSet, Vec<usize>)> = CharSet::disjoint(csets.iter()).collect::<Vec<_>>();

		let expected: Vec<(CharSet, Vec<usize>)> = vec![
			(CharSet::range(0_u32, 1_u32).unwrap(), vec![0, 1, 2]),
			(CharSet::range(2_u32, 3_u32).unwrap(), vec![0, 1, 2, 3]),
			(CharSet::range(4_u32, 4_u32).unwrap(), vec![0, 1, 3]),
			(CharSet::range(5_u32, 5_u32).unwrap(), vec![0, 1]),
			(CharSet::range(7_u32, 9_u32).unwrap(), vec![4]),
		];
		assert_eq!(result, expected);
	}

	#[test]
	fn disjoint_keeps_clamped_remainder() {
		// The overlap clamp lands exactly on the working range's end; the
		// single-point remainder must still be produced.
		let csets: Vec<CharSet> = vec![
			CharSet::range(0_u32, 3_u32).unwrap(),
			CharSet::range(3_u32, 9_u32).unwrap(),
		];

		let result: Vec<(CharSet, Vec<usize>)> = CharSet::disjoint(csets.iter()).collect::<Vec<_>>();

		let expected: Vec<(CharSet, Vec<usize>)> = vec![
			(CharSet::range(0_u32, 2_u32).unwrap(), vec![0]),
			(CharSet::range(3_u32, 3_u32).unwrap(), vec![0, 1]),
			(CharSet::range(4_u32, 9_u32).unwrap(), vec![1]),
		];
		assert_eq!(result, expected);
	}

	#[test]
	fn disjoint_multi_range_input() {
		let csets: Vec<CharSet> = vec![
			CharSet::from_ranges(vec![Range::new(0, 2), Range::new(10, 12)]),
			CharSet::range(1_u32, 11_u32).unwrap(),
		];

		let result: Vec<(CharSet, Vec<usize>)> = CharSet::disjoint(csets.iter()).collect::<Vec<_>>();

		let expected: Vec<(CharSet, Vec<usize>)> = vec![
			(CharSet::range(0_u32, 0_u32).unwrap(), vec![0]),
			(CharSet::range(1_u32, 2_u32).unwrap(), vec![0, 1]),
			(CharSet::range(3_u32, 9_u32).unwrap(), vec![1]),
			(CharSet::range(10_u32, 11_u32).unwrap(), vec![0, 1]),
			(CharSet::range(12_u32, 12_u32).unwrap(), vec![0]),
		];
		assert_eq!(result, expected);
	}

	// ==================================
	// Algebraic laws, checked over arbitrary sets.

	impl quickcheck::Arbitrary for CharSet {
		fn arbitrary(g: &mut quickcheck::Gen) -> Self {
			// Small domain so arbitrary sets actually overlap.
			let seeds: Vec<(u16, u8)> = Vec::arbitrary(g);
			let mut cset: CharSet = CharSet::new();
			for (start, span) in seeds.into_iter().take(8) {
				let start: u32 = u32::from(start) % 1024;
				let end: u32 = start + u32::from(span) % 16;
				add_range(&mut cset.ranges, start, end, None, None);
			}
			cset.len_cache.set(None);
			cset
		}
	}

	fn canonical(cset: &CharSet) -> bool {
		invariants(cset.ranges());
		cset.len() == cset.ranges().iter().map(Range::len).sum::<usize>()
	}

	quickcheck::quickcheck! {
		fn law_canonical_after_ops(a: CharSet, b: CharSet) -> bool {
			canonical(&(&a | &b)) && canonical(&(&a & &b)) && canonical(&(&a - &b)) && canonical(&(&a ^ &b))
		}

		fn law_complement(a: CharSet) -> bool {
			let full: CharSet = CharSet::range(MIN_CHAR, MAX_CHAR).unwrap();
			(&a | &!&a) == full && (&a & &!&a) == CharSet::new()
		}

		fn law_sym_difference(a: CharSet, b: CharSet) -> bool {
			(&a ^ &b) == (&(&a | &b) - &(&a & &b))
		}

		fn law_disjoint_iff_empty_intersection(a: CharSet, b: CharSet) -> bool {
			a.is_disjoint(&b) == (&a & &b).is_empty()
		}

		fn law_disjoint_decomposition(a: CharSet, b: CharSet, c: CharSet) -> bool {
			let inputs: Vec<CharSet> = vec![a, b, c];
			let pieces: Vec<(CharSet, Vec<usize>)> = CharSet::disjoint(inputs.iter()).collect::<Vec<_>>();

			// The pieces cover the union of the inputs...
			let mut cover: CharSet = CharSet::new();
			let mut total: usize = 0;
			for (piece, owners) in pieces.iter() {
				total += piece.len();
				cover |= piece;
				// ...and each piece is owned by exactly the inputs containing it.
				for (i, input) in inputs.iter().enumerate() {
					if piece.is_subset(input) != owners.contains(&i) {
						return false;
					}
				}
			}
			let mut wanted: CharSet = CharSet::new();
			for input in inputs.iter() {
				wanted |= input;
			}
			// Matching total length makes the pieces pairwise disjoint.
			cover == wanted && total == wanted.len()
		}
	}
}
