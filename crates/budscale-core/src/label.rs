//! Positional label derivation.
//!
//! A region's label is `"Bud "` followed by letters derived from its
//! zero-based position: `A` for 0 through `Z` for 25. Past 26 regions the
//! sequence continues in bijective base 26, the same way spreadsheet
//! columns are named: `AA`, `AB`, ..., `AZ`, `BA`, ..., `ZZ`, `AAA`.
//! Every index maps to exactly one letter sequence, so labels never
//! collide however large the collection grows.

/// Prefix shared by every region label.
pub const LABEL_PREFIX: &str = "Bud ";

/// Letter sequence for a zero-based position.
///
/// # Examples
///
/// ```
/// use budscale_core::label::letters;
///
/// assert_eq!(letters(0), "A");
/// assert_eq!(letters(25), "Z");
/// assert_eq!(letters(26), "AA");
/// assert_eq!(letters(701), "ZZ");
/// assert_eq!(letters(702), "AAA");
/// ```
#[must_use]
pub fn letters(index: usize) -> String {
    let mut out = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        #[expect(clippy::cast_possible_truncation)]
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    out.into_iter().map(char::from).collect()
}

/// Full label for a zero-based position, e.g. `"Bud C"` for 2.
#[must_use]
pub fn region_label(index: usize) -> String {
    format!("{LABEL_PREFIX}{}", letters(index))
}
