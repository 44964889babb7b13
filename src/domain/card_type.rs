//! Card brand catalogue and prefix-based brand detection.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    AmericanExpress,
    DinersClub,
    Discover,
    Jcb,
    Unionpay,
    Maestro,
    Mir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityCode {
    pub name: String,
    pub size: usize,
}

/// Descriptor of a card brand that matches (part of) a card number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardType {
    #[serde(rename = "type")]
    pub brand: CardBrand,
    pub nice_type: String,
    pub gaps: Vec<usize>,
    pub lengths: Vec<usize>,
    pub code: SecurityCode,
    pub supported: bool,
}

impl CardType {
    pub fn max_length(&self) -> usize {
        self.lengths.iter().copied().max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Prefix(u32),
    Range(u32, u32),
}

impl Pattern {
    fn len(self) -> usize {
        match self {
            Pattern::Prefix(prefix) => digits_len(prefix),
            Pattern::Range(min, _) => digits_len(min),
        }
    }

    fn matches(self, number: &str) -> bool {
        match self {
            Pattern::Prefix(prefix) => {
                let prefix = prefix.to_string();
                let n = prefix.len().min(number.len());
                prefix[..n] == number[..n]
            }
            Pattern::Range(min, max) => {
                let (min, max) = (min.to_string(), max.to_string());
                let n = min.len().min(number.len());
                let head = &number[..n];
                match (head.parse::<u32>(), min[..n].parse::<u32>(), max[..n].parse::<u32>()) {
                    (Ok(value), Ok(lo), Ok(hi)) => (lo..=hi).contains(&value),
                    _ => false,
                }
            }
        }
    }
}

fn digits_len(n: u32) -> usize {
    n.to_string().len()
}

struct BrandSpec {
    brand: CardBrand,
    nice_type: &'static str,
    patterns: &'static [Pattern],
    gaps: &'static [usize],
    lengths: &'static [usize],
    code: (&'static str, usize),
}

use Pattern::{Prefix, Range};

// Detection order matters: ties on match strength keep the earlier brand.
static CATALOGUE: &[BrandSpec] = &[
    BrandSpec {
        brand: CardBrand::Visa,
        nice_type: "Visa",
        patterns: &[Prefix(4)],
        gaps: &[4, 8, 12],
        lengths: &[16, 18, 19],
        code: ("CVV", 3),
    },
    BrandSpec {
        brand: CardBrand::Mastercard,
        nice_type: "Mastercard",
        patterns: &[
            Range(51, 55),
            Range(2221, 2229),
            Range(223, 229),
            Range(23, 26),
            Range(270, 271),
            Prefix(2720),
        ],
        gaps: &[4, 8, 12],
        lengths: &[16],
        code: ("CVC", 3),
    },
    BrandSpec {
        brand: CardBrand::AmericanExpress,
        nice_type: "American Express",
        patterns: &[Prefix(34), Prefix(37)],
        gaps: &[4, 10],
        lengths: &[15],
        code: ("CID", 4),
    },
    BrandSpec {
        brand: CardBrand::DinersClub,
        nice_type: "Diners Club",
        patterns: &[Range(300, 305), Prefix(36), Prefix(38), Prefix(39)],
        gaps: &[4, 10],
        lengths: &[14, 16, 19],
        code: ("CVV", 3),
    },
    BrandSpec {
        brand: CardBrand::Discover,
        nice_type: "Discover",
        patterns: &[Prefix(6011), Range(644, 649), Prefix(65)],
        gaps: &[4, 8, 12],
        lengths: &[16, 19],
        code: ("CID", 3),
    },
    BrandSpec {
        brand: CardBrand::Jcb,
        nice_type: "JCB",
        patterns: &[Prefix(2131), Prefix(1800), Range(3528, 3589)],
        gaps: &[4, 8, 12],
        lengths: &[16, 17, 18, 19],
        code: ("CVV", 3),
    },
    BrandSpec {
        brand: CardBrand::Unionpay,
        nice_type: "UnionPay",
        patterns: &[
            Prefix(620),
            Range(624, 626),
            Range(62100, 62182),
            Range(62184, 62187),
            Range(62185, 62197),
            Range(62200, 62205),
            Range(622010, 622999),
            Prefix(622018),
            Range(622019, 622999),
            Range(62207, 62209),
            Range(623, 626),
            Prefix(6270),
            Prefix(6272),
            Prefix(6276),
            Range(627700, 627779),
            Range(627781, 627799),
            Range(6282, 6289),
            Prefix(6291),
            Prefix(6292),
            Prefix(810),
            Range(8110, 8131),
            Range(8132, 8151),
            Range(8152, 8163),
            Range(8164, 8171),
        ],
        gaps: &[4, 8, 12],
        lengths: &[14, 15, 16, 17, 18, 19],
        code: ("CVN", 3),
    },
    BrandSpec {
        brand: CardBrand::Maestro,
        nice_type: "Maestro",
        patterns: &[
            Prefix(493698),
            Range(500000, 504174),
            Range(504176, 506698),
            Range(506779, 508999),
            Range(56, 59),
            Prefix(63),
            Prefix(67),
            Prefix(6),
        ],
        gaps: &[4, 8, 12],
        lengths: &[12, 13, 14, 15, 16, 17, 18, 19],
        code: ("CVC", 3),
    },
    BrandSpec {
        brand: CardBrand::Mir,
        nice_type: "Mir",
        patterns: &[Range(2200, 2204)],
        gaps: &[4, 8, 12],
        lengths: &[16, 17, 18, 19],
        code: ("CVP2", 3),
    },
];

impl BrandSpec {
    fn descriptor(&self) -> CardType {
        CardType {
            brand: self.brand,
            nice_type: self.nice_type.to_string(),
            gaps: self.gaps.to_vec(),
            lengths: self.lengths.to_vec(),
            code: SecurityCode {
                name: self.code.0.to_string(),
                size: self.code.1,
            },
            supported: true,
        }
    }
}

/// Descriptor for a single brand.
pub fn card_type(brand: CardBrand) -> Option<CardType> {
    CATALOGUE
        .iter()
        .find(|spec| spec.brand == brand)
        .map(BrandSpec::descriptor)
}

/// Brands matching a digits-only card number.
///
/// Empty input matches every brand. When every candidate has a fully typed
/// prefix, only the strongest (longest prefix) candidate is returned; otherwise
/// all partial candidates are. Input with non-digits matches nothing.
pub fn detect(number: &str) -> Vec<CardType> {
    if !number.bytes().all(|b| b.is_ascii_digit()) {
        return Vec::new();
    }
    if number.is_empty() {
        return CATALOGUE.iter().map(BrandSpec::descriptor).collect();
    }

    let mut candidates: Vec<(CardType, Option<usize>)> = Vec::new();
    for spec in CATALOGUE {
        if let Some(pattern) = spec.patterns.iter().find(|p| p.matches(number)) {
            let strength = (number.len() >= pattern.len()).then(|| pattern.len());
            candidates.push((spec.descriptor(), strength));
        }
    }

    if !candidates.is_empty() && candidates.iter().all(|(_, strength)| strength.is_some()) {
        let mut best: Option<(CardType, Option<usize>)> = None;
        for candidate in candidates {
            match &best {
                Some((_, strength)) if *strength >= candidate.1 => {}
                _ => best = Some(candidate),
            }
        }
        return best.map(|(card, _)| vec![card]).unwrap_or_default();
    }

    candidates.into_iter().map(|(card, _)| card).collect()
}
