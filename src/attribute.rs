use std::{fmt, str::FromStr};

use thiserror::Error;

/// A product vertical with its own attribute vocabulary.
///
/// `All` is an aggregate used only when composing an instruction for every
/// vertical at once; it never names a catalog listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Category {
    Bra,
    Panty,
    LingerieSet,
    Shapewear,
    Clothing,
    Accessories,
    Sportswear,
    Sleepwear,
    All,
}

#[derive(Debug, Error)]
#[error("unknown category: {0}")]
pub(crate) struct UnknownCategory(String);

impl Category {
    /// Every concrete vertical, in the order the storefront lists them.
    pub(crate) const CONCRETE: [Category; 8] = [
        Category::Bra,
        Category::Panty,
        Category::LingerieSet,
        Category::Shapewear,
        Category::Clothing,
        Category::Accessories,
        Category::Sportswear,
        Category::Sleepwear,
    ];

    pub(crate) fn slug(self) -> &'static str {
        match self {
            Category::Bra => "bra",
            Category::Panty => "panty",
            Category::LingerieSet => "lingerie-set",
            Category::Shapewear => "shapewear",
            Category::Clothing => "clothing",
            Category::Accessories => "accessories",
            Category::Sportswear => "sportswear",
            Category::Sleepwear => "sleepwear",
            Category::All => "all",
        }
    }

    /// Category-specific attributes, excluding the shared ones.
    pub(crate) fn attributes(self) -> &'static [Attribute] {
        match self {
            Category::Bra => BRA,
            Category::Panty => PANTY,
            Category::LingerieSet => LINGERIE_SET,
            Category::Shapewear => SHAPEWEAR,
            Category::Clothing => CLOTHING,
            Category::Accessories => ACCESSORIES,
            Category::Sportswear => SPORTSWEAR,
            Category::Sleepwear => SLEEPWEAR,
            Category::All => &[],
        }
    }

    /// The full vocabulary of a concrete category: its own attributes
    /// followed by the shared ones.
    pub(crate) fn vocabulary(self) -> impl Iterator<Item = &'static Attribute> {
        self.attributes().iter().chain(SHARED.iter())
    }

    pub(crate) fn attribute(self, name: &str) -> Option<&'static Attribute> {
        self.vocabulary().find(|attr| attr.name == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = normalize_token(s);
        if token == Category::All.slug() {
            return Ok(Category::All);
        }
        Category::CONCRETE
            .into_iter()
            .find(|c| c.slug() == token)
            .ok_or(UnknownCategory(s.to_string()))
    }
}

/// A named filter dimension and its legal value tokens.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Attribute {
    pub(crate) name: &'static str,
    pub(crate) values: &'static [&'static str],
}

impl Attribute {
    /// Returns the registered token matching `value`, if any.
    pub(crate) fn canonical(&self, value: &str) -> Option<&'static str> {
        let token = normalize_token(value);
        self.values.iter().copied().find(|v| *v == token)
    }
}

/// Lower-cases a token and replaces inner whitespace runs with hyphens, the
/// form every value takes inside a catalog URL.
pub(crate) fn normalize_token(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

const SHARED: &[Attribute] = &[Attribute {
    name: "price",
    values: &[
        "0-300",
        "300-600",
        "600-900",
        "900-1200",
        "1200-1500",
        "1500-1800",
    ],
}];

const BASE_COLORS: &[&str] = &[
    "grey", "black", "white", "skin", "brown", "yellow", "orange", "pink", "red", "green", "blue",
    "purple", "prints",
];

const COLORS: &[&str] = &[
    "grey",
    "black",
    "white",
    "skin",
    "brown",
    "yellow",
    "orange",
    "pink",
    "red",
    "green",
    "blue",
    "purple",
    "prints",
    "multicolor",
];

const JACQUARD_COLORS: &[&str] = &[
    "grey",
    "black",
    "white",
    "skin",
    "brown",
    "yellow",
    "orange",
    "pink",
    "red",
    "green",
    "blue",
    "purple",
    "prints",
    "multicolor",
    "jacquard",
];

const LETTER_SIZES: &[&str] = &["xs", "s", "m", "l", "xl", "2xl", "3xl", "4xl", "5xl"];

const BRA: &[Attribute] = &[
    Attribute {
        name: "offers",
        values: &[
            "buy-3-for-1199",
            "buy-2-for-1299",
            "flat-20%-off",
            "buy-3-for-899",
            "flat-50%-off",
            "flat-40%-off",
            "new-arrival",
        ],
    },
    Attribute {
        name: "color-family",
        values: BASE_COLORS,
    },
    Attribute {
        name: "fabric",
        values: &[
            "nylon",
            "viscose-spandex",
            "nylon-polyester-spandex",
            "cotton",
            "cotton-spandex",
            "lace",
            "mesh",
            "modal",
            "polyester-spandex",
            "polycotton-spandex",
            "satin",
        ],
    },
    Attribute {
        name: "bra-type",
        values: &[
            "beginners",
            "bralette",
            "cami",
            "everyday",
            "fashion-fancy",
            "minimiser",
            "push-up",
            "t-shirt",
        ],
    },
    Attribute {
        name: "bra-feature",
        values: &[
            "backless",
            "bridal",
            "casual",
            "designer",
            "fancy-back",
            "front-open",
            "hi-support",
            "lacework",
            "longline",
            "moulded",
            "no-sag",
            "plus-size",
            "printed",
            "sexy",
            "sleep",
            "transparent",
        ],
    },
    Attribute {
        name: "bra-coverage",
        values: &["full-coverage", "3-4-th-coverage", "demi-coverage"],
    },
    Attribute {
        name: "bra-padding",
        values: &["non-padded", "padded", "removable-padding", "lightly-padded"],
    },
    Attribute {
        name: "bra-wiring",
        values: &["wired", "wirefree"],
    },
    Attribute {
        name: "bra-cup-shape",
        values: &["balconette", "balcony", "full-cup", "plunge", "t-shirt-cup"],
    },
    Attribute {
        name: "bra-push-up-level",
        values: &["level-1", "level-2", "level-3"],
    },
    Attribute {
        name: "bra-closure",
        values: &["back-closure", "front-closure", "slip-on"],
    },
    Attribute {
        name: "brand",
        values: &["susie", "taabu", "shyle", "shyaway"],
    },
    Attribute {
        name: "size",
        values: &[
            "30a", "30b", "30c", "30d", "30dd", "32a", "32b", "32c", "32d", "32dd", "34a", "34b",
            "34c", "34d", "34dd", "36a", "36b", "36c", "36d", "36dd", "38a", "38b", "38c", "38d",
            "38dd", "40a", "40b", "40c", "40d", "40dd", "42a", "42b", "42c", "42d", "42dd", "44a",
            "44b", "44c", "44d", "44dd", "46a", "46b", "46c", "46d", "46dd", "48a", "48b", "48c",
            "48d", "48dd", "50a", "50b", "50c", "50d", "50dd", "52a", "52b", "52c", "52d", "52dd",
        ],
    },
];

const PANTY: &[Attribute] = &[
    Attribute {
        name: "offers",
        values: &[
            "buy-3-for-499",
            "buy-3-for-599",
            "flat-20%-off",
            "flat-30",
            "new-arrival",
        ],
    },
    Attribute {
        name: "brand",
        values: &["susie", "taabu", "shyle", "shyaway"],
    },
    Attribute {
        name: "color-family",
        values: COLORS,
    },
    Attribute {
        name: "size",
        values: &[
            "2xl", "2xl-3xl", "3xl", "4xl", "5xl", "l", "l-xl", "m", "s", "s-m", "xl", "xs", "xxl",
        ],
    },
    Attribute {
        name: "fabric",
        values: &[
            "cotton-spandex",
            "disposable",
            "lace",
            "mesh",
            "modal",
            "nylon",
            "nylon-spandex",
            "polycotton-spandex",
            "polyester-spandex",
            "viscose-spandex",
        ],
    },
    Attribute {
        name: "panty-type",
        values: &[
            "bikini",
            "boy-shorts",
            "cycling-shorts",
            "hipster",
            "period-panty",
            "thong",
            "tummy-tucker",
        ],
    },
    Attribute {
        name: "panty-feature",
        values: &[
            "bridal",
            "casual",
            "lacework",
            "maternity",
            "no-vpl",
            "plus-size",
            "printed",
            "seamless",
            "sexy",
            "transparent",
        ],
    },
    Attribute {
        name: "panty-coverage",
        values: &[
            "full-coverage",
            "low-coverage",
            "medium-coverage",
            "no-coverage",
        ],
    },
    Attribute {
        name: "panty-waist-level",
        values: &["high-waist", "low-waist", "medium-waist"],
    },
];

const LINGERIE_SET: &[Attribute] = &[
    Attribute {
        name: "offers",
        values: &[
            "buy-3-for-499",
            "buy-3-for-599",
            "flat-20%-off",
            "flat-30",
            "new-arrival",
        ],
    },
    Attribute {
        name: "size",
        values: &[
            "38d/xl", "40b/xxl", "40c/xxl", "40d/xxl", "32d/s", "32-d/dd", "34-d/dd", "36-d/dd",
            "38-d/dd", "40-d/dd", "42-d/dd", "44-d/dd", "46-d/dd", "48-d/dd", "50-d/dd", "52-d/dd",
            "54-d/dd", "56-d/dd", "58-d/dd", "2xl/3xl", "4xl/5xl",
        ],
    },
    Attribute {
        name: "brand",
        values: &["susie", "taabu", "shyle"],
    },
    Attribute {
        name: "color-family",
        values: COLORS,
    },
    Attribute {
        name: "fabric",
        values: &["cotton-spandex", "lace", "mesh", "nylon-spandex"],
    },
    Attribute {
        name: "lingerieset-type",
        values: &["everyday", "fashion-fancy-bra", "push-up", "t-shirt"],
    },
    Attribute {
        name: "lingerieset-panty-type",
        values: &["bikini", "hipster", "thong"],
    },
    Attribute {
        name: "lingerieset-feature",
        values: &[
            "bridal",
            "casual",
            "hi-support",
            "lacework",
            "moulded",
            "no-sag",
            "printed",
            "sexy",
            "transparent",
        ],
    },
    Attribute {
        name: "lingerieset-panty-feature",
        values: &[
            "bridal",
            "transparent",
            "lacework",
            "casual",
            "sexy",
            "printed",
        ],
    },
    Attribute {
        name: "lingerieset-bra-closure",
        values: &["back-closure", "front-closure", "side-closure", "slip-on"],
    },
    Attribute {
        name: "lingerieset-bra-coverage",
        values: &["demi-coverage", "full-coverage", "3/4th-coverage"],
    },
    Attribute {
        name: "lingerieset-panty-coverage",
        values: &[
            "full-coverage",
            "medium-coverage",
            "no-coverage",
            "low-coverage",
        ],
    },
    Attribute {
        name: "lingerieset-bra-padding",
        values: &["padded", "non-padded"],
    },
    Attribute {
        name: "lingerieset-bra-wiring",
        values: &["wired", "wirefree"],
    },
    Attribute {
        name: "lingerieset-panty-waist-level",
        values: &["hi-impact", "low-waist", "medium-waist"],
    },
    Attribute {
        name: "lingerieset-bra-seam",
        values: &["seamless", "seamed", "darted"],
    },
    Attribute {
        name: "lingerieset-bra-cup-shape",
        values: &["balconette", "balcony", "full-cup", "plunge", "t-shirt-cup"],
    },
    Attribute {
        name: "lingerieset-push-up-level",
        values: &["level-2", "level-3"],
    },
    Attribute {
        name: "lingerieset-bra-straps",
        values: &[
            "back-adjustable",
            "detachable",
            "front-adjustable",
            "fully-adjustable",
            "multiway",
            "non-detachable",
        ],
    },
];

const SPORTSWEAR: &[Attribute] = &[
    Attribute {
        name: "offers",
        values: &["flat-20%-off"],
    },
    Attribute {
        name: "size",
        values: &["xs", "s", "m", "l", "xl", "2xl", "3xl", "xxl", "xxxl"],
    },
    Attribute {
        name: "brand",
        values: &["shyaway", "shyle", "united-classic", "van-heusen"],
    },
    Attribute {
        name: "color-family",
        values: COLORS,
    },
    Attribute {
        name: "sportswear-type",
        values: &["bra", "bottoms", "tops"],
    },
    Attribute {
        name: "sportswear-feature",
        values: &[
            "racerback",
            "cross-back",
            "leggings",
            "hoodies",
            "seamless",
            "classic-back",
            "crop-top",
            "jackets",
            "shorts",
            "t-back",
            "t-shirt",
            "joggers",
            "skorts",
            "tank",
        ],
    },
    Attribute {
        name: "sportswear-bra-coverage",
        values: &["high-coverage", "medium-coverage", "low-coverage"],
    },
    Attribute {
        name: "sportswear-bra-impact_level",
        values: &["low-impact", "medium-impact", "hi-impact"],
    },
    Attribute {
        name: "sportswear-bra-padding",
        values: &["padded", "removable-padding"],
    },
    Attribute {
        name: "sportswear-bra-wiring",
        values: &["wirefree"],
    },
];

const SLEEPWEAR: &[Attribute] = &[
    Attribute {
        name: "fabric",
        values: &[
            "bamboo",
            "cotton",
            "cotton-spandex",
            "lace",
            "mesh",
            "modal",
            "nylon-spandex",
            "polyester-spandex",
            "satin",
            "viscose",
        ],
    },
    Attribute {
        name: "nightwear-feature",
        values: &["intimate", "loungewear", "maternity", "winter-sleepwear"],
    },
    Attribute {
        name: "nightwear-type",
        values: &[
            "babydoll-and-chemise",
            "camisole-and-slip",
            "tops",
            "nightwear-sets",
            "sleep-tee",
            "sleepwear-bottoms",
            "nightgowns",
        ],
    },
    Attribute {
        name: "color-family",
        values: COLORS,
    },
    Attribute {
        name: "size",
        values: LETTER_SIZES,
    },
    Attribute {
        name: "offers",
        values: &["buy-2-for-599", "flat-20%-off"],
    },
];

const SHAPEWEAR: &[Attribute] = &[
    Attribute {
        name: "shapewear-type",
        values: &[
            "saree",
            "butt-shaper",
            "tummy-tucker",
            "body-shaper",
            "thigh-shaper",
            "torso-slimmer",
            "shaping-panty",
            "mid-thigh-shaper",
            "compression-tights",
        ],
    },
    Attribute {
        name: "size",
        values: LETTER_SIZES,
    },
    Attribute {
        name: "brand",
        values: &["mybra", "shyle", "united-classic"],
    },
    Attribute {
        name: "color-family",
        values: JACQUARD_COLORS,
    },
    Attribute {
        name: "fabric",
        values: &[
            "nylon-spandex",
            "polycotton-spandex",
            "polyester-spandex",
            "viscose",
        ],
    },
    Attribute {
        name: "offers",
        values: &["flat-20%-off"],
    },
];

const ACCESSORIES: &[Attribute] = &[
    Attribute {
        name: "accessories-type",
        values: &[
            "bra-bag",
            "bra-essentials",
            "hosiery",
            "masks",
            "socks",
            "boob-tape",
            "adhesive-stick-on",
            "silicone-nipple-pad",
            "bra-extender",
        ],
    },
    Attribute {
        name: "brand",
        values: &["shyle"],
    },
    Attribute {
        name: "color-family",
        values: JACQUARD_COLORS,
    },
    Attribute {
        name: "fabric",
        values: &[
            "cotton-spandex",
            "elastic",
            "eva",
            "lace",
            "mesh",
            "nylon-spandex",
            "polycotton-spandex",
            "polyester-spandex",
            "silicone",
        ],
    },
    Attribute {
        name: "offers",
        values: &["flat-20%-off"],
    },
];

const CLOTHING: &[Attribute] = &[
    Attribute {
        name: "clothing-type",
        values: &["legwear", "scarves", "shrugs-&-jackets", "tops"],
    },
    Attribute {
        name: "size",
        values: &["fz"],
    },
    Attribute {
        name: "brand",
        values: &["shyle"],
    },
    Attribute {
        name: "fabric",
        values: &[
            "cotton-spandex",
            "disposable",
            "elastic",
            "eva",
            "lace",
            "mesh",
            "nylon-spandex",
            "polycotton-spandex",
            "polyester-spandex",
            "silicone",
        ],
    },
    Attribute {
        name: "color-family",
        values: &[
            "black",
            "blue",
            "brown",
            "green",
            "multicolor",
            "orange",
            "pink",
            "prints",
            "red",
            "skin",
            "white",
            "yellow",
        ],
    },
    Attribute {
        name: "offers",
        values: &["flat-10"],
    },
];
