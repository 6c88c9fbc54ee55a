
// Bits are stored LSB-first: bit k of word w holds entry 64*w + k

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitTable {
	words: Vec<u64>,
	len: usize,
}

impl BitTable {

	pub fn zeros(len:usize) -> Self { Self { words: vec![0; (len + 63) / 64], len } }

	pub fn from_fn<F: FnMut(usize) -> bool>(len:usize, mut f:F) -> Self {
		let mut table = Self::zeros(len);
		for i in 0..len {
			if f(i) { table.words[i / 64] |= 1u64 << (i % 64); }
		}
		table
	}

	/// Builds a table from whole words; bits beyond `len` in the last word are cleared
	pub fn from_words(mut words:Vec<u64>, len:usize) -> Self {
		words.resize((len + 63) / 64, 0);
		if len % 64 != 0 {
			if let Some(last) = words.last_mut() { *last &= (1u64 << (len % 64)) - 1; }
		}
		Self { words, len }
	}

	pub fn len(&self) -> usize { self.len }
	pub fn is_empty(&self) -> bool { self.len == 0 }

	pub fn get(&self, i:usize) -> bool { (self.words[i / 64] >> (i % 64)) & 1 == 1 }

	pub fn set(&mut self, i:usize, bit:bool) {
		if bit { self.words[i / 64] |=   1u64 << (i % 64);  }
		else   { self.words[i / 64] &= !(1u64 << (i % 64)); }
	}

	pub fn count_ones(&self) -> usize { self.words.iter().map(|w| w.count_ones() as usize).sum() }

	/// Returns `n` (at most 64) consecutive bits starting at `offset`, LSB first.  The range must lie inside the table.
	pub fn bits(&self, offset:usize, n:usize) -> u64 {
		debug_assert!(n <= 64 && offset + n <= self.len);
		if n == 0 { return 0; }

		let w = offset / 64;
		let s = offset % 64;
		let mut ans = self.words[w] >> s;
		if s > 0 && s + n > 64 { ans |= self.words[w + 1] << (64 - s); }

		if n < 64 { ans & ((1u64 << n) - 1) } else { ans }
	}

	/// Like `bits`, but treats the table as periodic so the range may run past the end
	pub fn bits_cyclic(&self, offset:usize, n:usize) -> u64 {
		debug_assert!(n <= 64 && !self.is_empty());
		let mut ans:u64 = 0;
		let mut done:usize = 0;
		let mut pos = offset % self.len;
		while done < n {
			let k = (n - done).min(self.len - pos);
			ans |= self.bits(pos, k) << done;
			done += k;
			pos = (pos + k) % self.len;
		}
		ans
	}

}

#[cfg(test)]
mod tests {

	use super::BitTable;

	fn pattern(i:usize) -> bool { (i * 7 + i / 3) % 5 < 2 }

	#[test]
	fn get_and_set() {
		let mut t = BitTable::zeros(130);
		t.set(0, true);
		t.set(64, true);
		t.set(129, true);
		assert!(t.get(0) && t.get(64) && t.get(129));
		assert!(!t.get(1) && !t.get(63) && !t.get(128));
		t.set(64, false);
		assert!(!t.get(64));
		assert_eq!(t.count_ones(), 2);
	}

	#[test]
	fn bits_across_word_boundary() {
		let t = BitTable::from_fn(200, pattern);
		for &(offset, n) in &[(0, 64), (3, 64), (60, 10), (63, 2), (100, 64), (136, 64), (199, 1)] {
			let expected = (0..n).filter(|k| pattern(offset + k)).fold(0u64, |acc, k| acc | (1u64 << k));
			assert_eq!(t.bits(offset, n), expected, "offset={} n={}", offset, n);
		}
	}

	#[test]
	fn bits_cyclic_wraps_short_tables() {
		let t = BitTable::from_fn(5, |i| i == 0 || i == 3);
		// 1,0,0,1,0 repeated, LSB first
		let v = t.bits_cyclic(3, 12);
		let expected:Vec<bool> = (0..12).map(|k| { let i = (3 + k) % 5; i == 0 || i == 3 }).collect();
		for (k, bit) in expected.iter().enumerate() {
			assert_eq!((v >> k) & 1 == 1, *bit);
		}
	}

	#[test]
	fn from_words_clears_tail() {
		let t = BitTable::from_words(vec![u64::MAX, u64::MAX], 70);
		assert_eq!(t.count_ones(), 70);
		assert_eq!(t.bits(64, 6), 0b111111);
	}

}
