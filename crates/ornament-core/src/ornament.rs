//! Ornament types and the user ornament set

use glam::Vec3;
use rand::Rng;
use std::collections::HashSet;
use uuid::Uuid;

/// Country tokens offered by the form and used for decorative ornaments
pub const COUNTRIES: [&str; 7] = ["🇯🇵", "🇺🇸", "🇫🇷", "🇧🇷", "🇩🇪", "🇨🇳", "🇰🇷"];

/// Country preselected in the form
pub const DEFAULT_COUNTRY: &str = "🇯🇵";

/// Two-letter region code for a flag token ("🇫🇷" -> "FR").
///
/// Flags are pairs of regional indicator symbols; anything else is returned
/// unchanged. Used as a readable fallback where flag glyphs cannot be drawn.
pub fn country_label(token: &str) -> String {
    const REGIONAL_A: u32 = 0x1F1E6;
    let letters: Option<String> = token
        .chars()
        .map(|c| {
            let offset = (c as u32).checked_sub(REGIONAL_A)?;
            (offset < 26).then(|| char::from(b'A' + offset as u8))
        })
        .collect();
    match letters {
        Some(code) if !code.is_empty() => code,
        _ => token.to_string(),
    }
}

/// Client-generated identifier attached to ornaments this client creates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrnamentId(pub Uuid);

impl OrnamentId {
    /// Generate a random (version 4) identifier from the given RNG
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(uuid::Builder::from_random_bytes(rng.gen()).into_uuid())
    }

    /// Parse an identifier coming back from the store
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl std::fmt::Display for OrnamentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single positioned marker with a country token and a message
#[derive(Debug, Clone, PartialEq)]
pub struct Ornament {
    /// None for decorative ornaments and legacy rows
    pub id: Option<OrnamentId>,
    pub position: Vec3,
    pub country: String,
    pub message: String,
}

impl Ornament {
    pub fn new(position: Vec3, country: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            position,
            country: country.into(),
            message: message.into(),
        }
    }

    pub fn with_id(mut self, id: OrnamentId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Which of the two ornament sets an ornament belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrnamentKind {
    Decorative,
    User,
}

/// Stable reference to a rendered ornament: its set and its index in that set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrnamentRef {
    pub kind: OrnamentKind,
    pub index: usize,
}

impl OrnamentRef {
    pub fn decorative(index: usize) -> Self {
        Self { kind: OrnamentKind::Decorative, index }
    }

    pub fn user(index: usize) -> Self {
        Self { kind: OrnamentKind::User, index }
    }
}

/// The user set: ornaments loaded from the store, received over the
/// realtime channel, or submitted locally.
///
/// Append-only. Ornaments carrying an id are kept at most once, so the
/// realtime echo of a local insert does not produce a second marker.
/// Ornaments without an id are always appended.
#[derive(Debug, Clone, Default)]
pub struct OrnamentBook {
    ornaments: Vec<Ornament>,
    known_ids: HashSet<OrnamentId>,
}

impl OrnamentBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an ornament. Returns false if its id was already present.
    pub fn push(&mut self, ornament: Ornament) -> bool {
        if let Some(id) = ornament.id {
            if !self.known_ids.insert(id) {
                tracing::debug!("Skipping duplicate ornament {}", id);
                return false;
            }
        }
        self.ornaments.push(ornament);
        true
    }

    /// Append many ornaments, returning how many were actually added
    pub fn extend(&mut self, ornaments: impl IntoIterator<Item = Ornament>) -> usize {
        let mut added = 0;
        for ornament in ornaments {
            if self.push(ornament) {
                added += 1;
            }
        }
        added
    }

    pub fn contains_id(&self, id: &OrnamentId) -> bool {
        self.known_ids.contains(id)
    }

    pub fn get(&self, index: usize) -> Option<&Ornament> {
        self.ornaments.get(index)
    }

    pub fn len(&self) -> usize {
        self.ornaments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ornaments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ornament> {
        self.ornaments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_id_is_v4() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = OrnamentId::random(&mut rng);
        assert_eq!(id.0.get_version_num(), 4);
        assert_ne!(id, OrnamentId::random(&mut rng));
    }

    #[test]
    fn test_parse_id() {
        let mut rng = StdRng::seed_from_u64(1);
        let id = OrnamentId::random(&mut rng);
        assert_eq!(OrnamentId::parse(&id.to_string()), Some(id));
        assert_eq!(OrnamentId::parse("not-a-uuid"), None);
    }

    #[test]
    fn test_country_label() {
        assert_eq!(country_label("🇫🇷"), "FR");
        assert_eq!(country_label("🇯🇵"), "JP");
        assert_eq!(country_label("Narnia"), "Narnia");
        assert_eq!(country_label(""), "");
    }

    #[test]
    fn test_book_skips_duplicate_ids() {
        let mut rng = StdRng::seed_from_u64(3);
        let id = OrnamentId::random(&mut rng);
        let mut book = OrnamentBook::new();

        assert!(book.push(Ornament::new(Vec3::ONE, "🇫🇷", "Hi").with_id(id)));
        assert!(!book.push(Ornament::new(Vec3::ONE, "🇫🇷", "Hi").with_id(id)));
        assert_eq!(book.len(), 1);
        assert!(book.contains_id(&id));
    }

    #[test]
    fn test_book_keeps_anonymous_ornaments() {
        let mut book = OrnamentBook::new();
        let added = book.extend(vec![
            Ornament::new(Vec3::ZERO, "", ""),
            Ornament::new(Vec3::ZERO, "", ""),
        ]);
        assert_eq!(added, 2);
        assert_eq!(book.len(), 2);
        assert_eq!(book.get(1).map(|o| o.message.as_str()), Some(""));
    }
}
