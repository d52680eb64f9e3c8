//! Validation code minting.
//!
//! Codes follow a `color-noun-suffix` scheme (e.g. `amber-falcon-x7k2`):
//! human-readable enough to be typed if a scanner's camera fails, short
//! enough for a dense QR payload, and drawn from a lowercase alphanumeric
//! plus hyphen alphabet so they are URL-safe as-is.
//!
//! Minting is a pure function over the caller's RNG; collision handling
//! against the live pool lives in [`crate::pool::CodePool::generate_code`].

use rand::Rng;

const COLORS: [&str; 20] = [
    "amber", "azure", "coral", "crimson", "ebony", "emerald", "fuchsia", "golden", "indigo",
    "ivory", "jade", "lilac", "maroon", "ochre", "olive", "scarlet", "sienna", "teal", "umber",
    "violet",
];

const NOUNS: [&str; 24] = [
    "badger", "bison", "condor", "coyote", "falcon", "gannet", "heron", "ibex", "jackal",
    "kestrel", "lynx", "marmot", "marten", "osprey", "otter", "pelican", "puffin", "raven",
    "serval", "stoat", "tapir", "toucan", "weasel", "wombat",
];

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 4;

/// Mint a fresh candidate code.
///
/// Roughly one billion combinations per event (20 colors x 24 nouns x
/// 36^4 suffixes), so collisions within a single event's pool are rare
/// and recovered by the caller's bounded retry.
pub(crate) fn mint<R: Rng>(rng: &mut R) -> String {
    let color = COLORS[rng.gen_range(0..COLORS.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    let mut code = String::with_capacity(color.len() + noun.len() + SUFFIX_LEN + 2);
    code.push_str(color);
    code.push('-');
    code.push_str(noun);
    code.push('-');
    push_suffix(rng, &mut code);
    code
}

/// Mint with a time-derived disambiguator appended.
///
/// Used only when the bounded retry in `generate_code` exhausts: the
/// millisecond timestamp plus nonce makes the code unique within the
/// event by construction.
pub(crate) fn mint_disambiguated<R: Rng>(rng: &mut R, unix_millis: i64, nonce: u32) -> String {
    let mut code = mint(rng);
    code.push('-');
    code.push_str(&to_base36(
        unix_millis.unsigned_abs().wrapping_add(u64::from(nonce)),
    ));
    code
}

fn push_suffix<R: Rng>(rng: &mut R, code: &mut String) {
    for _ in 0..SUFFIX_LEN {
        let idx = rng.gen_range(0..SUFFIX_ALPHABET.len());
        code.push(char::from(SUFFIX_ALPHABET[idx]));
    }
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let idx = (value % 36) as usize;
        digits.push(SUFFIX_ALPHABET[idx]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}
