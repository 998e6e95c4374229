//! Standard simple-font encodings and glyph name → Unicode derivation

/// Predefined base encodings of simple fonts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseEncoding {
    Standard,
    WinAnsi,
    MacRoman,
}

impl BaseEncoding {
    /// Parse an `/Encoding` or `/BaseEncoding` name
    pub fn from_pdf_name(name: &[u8]) -> Option<Self> {
        match name {
            b"StandardEncoding" => Some(BaseEncoding::Standard),
            b"WinAnsiEncoding" => Some(BaseEncoding::WinAnsi),
            b"MacRomanEncoding" => Some(BaseEncoding::MacRoman),
            _ => None,
        }
    }

    pub fn pdf_name(&self) -> &'static [u8] {
        match self {
            BaseEncoding::Standard => b"StandardEncoding",
            BaseEncoding::WinAnsi => b"WinAnsiEncoding",
            BaseEncoding::MacRoman => b"MacRomanEncoding",
        }
    }

    /// Glyph name assigned to `code`, if any
    pub fn glyph_name(&self, code: u8) -> Option<&'static str> {
        match code {
            0x20..=0x7E => Some(match (self, code) {
                (BaseEncoding::Standard, 0x27) => "quoteright",
                (BaseEncoding::Standard, 0x60) => "quoteleft",
                _ => ASCII_NAMES[(code - 0x20) as usize],
            }),
            0x80..=0xFF => {
                let table = match self {
                    BaseEncoding::Standard => &STANDARD_HIGH,
                    BaseEncoding::WinAnsi => &WIN_ANSI_HIGH,
                    BaseEncoding::MacRoman => &MAC_ROMAN_HIGH,
                };
                table[(code - 0x80) as usize]
            }
            _ => None,
        }
    }
}

/// Codes 0x20 through 0x7E, WinAnsi/MacRoman spelling
const ASCII_NAMES: [&str; 95] = [
    "space", "exclam", "quotedbl", "numbersign", "dollar", "percent", "ampersand", "quotesingle",
    "parenleft", "parenright", "asterisk", "plus", "comma", "hyphen", "period", "slash",
    "zero", "one", "two", "three", "four", "five", "six", "seven",
    "eight", "nine", "colon", "semicolon", "less", "equal", "greater", "question",
    "at", "A", "B", "C", "D", "E", "F", "G",
    "H", "I", "J", "K", "L", "M", "N", "O",
    "P", "Q", "R", "S", "T", "U", "V", "W",
    "X", "Y", "Z", "bracketleft", "backslash", "bracketright", "asciicircum", "underscore",
    "grave", "a", "b", "c", "d", "e", "f", "g",
    "h", "i", "j", "k", "l", "m", "n", "o",
    "p", "q", "r", "s", "t", "u", "v", "w",
    "x", "y", "z", "braceleft", "bar", "braceright", "asciitilde",
];

const STANDARD_HIGH: [Option<&str>; 128] = {
    let mut t: [Option<&str>; 128] = [None; 128];
    t[0xA1 - 0x80] = Some("exclamdown");
    t[0xA2 - 0x80] = Some("cent");
    t[0xA3 - 0x80] = Some("sterling");
    t[0xA4 - 0x80] = Some("fraction");
    t[0xA5 - 0x80] = Some("yen");
    t[0xA6 - 0x80] = Some("florin");
    t[0xA7 - 0x80] = Some("section");
    t[0xA8 - 0x80] = Some("currency");
    t[0xA9 - 0x80] = Some("quotesingle");
    t[0xAA - 0x80] = Some("quotedblleft");
    t[0xAB - 0x80] = Some("guillemotleft");
    t[0xAC - 0x80] = Some("guilsinglleft");
    t[0xAD - 0x80] = Some("guilsinglright");
    t[0xAE - 0x80] = Some("fi");
    t[0xAF - 0x80] = Some("fl");
    t[0xB1 - 0x80] = Some("endash");
    t[0xB2 - 0x80] = Some("dagger");
    t[0xB3 - 0x80] = Some("daggerdbl");
    t[0xB4 - 0x80] = Some("periodcentered");
    t[0xB6 - 0x80] = Some("paragraph");
    t[0xB7 - 0x80] = Some("bullet");
    t[0xB8 - 0x80] = Some("quotesinglbase");
    t[0xB9 - 0x80] = Some("quotedblbase");
    t[0xBA - 0x80] = Some("quotedblright");
    t[0xBB - 0x80] = Some("guillemotright");
    t[0xBC - 0x80] = Some("ellipsis");
    t[0xBD - 0x80] = Some("perthousand");
    t[0xBF - 0x80] = Some("questiondown");
    t[0xC1 - 0x80] = Some("grave");
    t[0xC2 - 0x80] = Some("acute");
    t[0xC3 - 0x80] = Some("circumflex");
    t[0xC4 - 0x80] = Some("tilde");
    t[0xC5 - 0x80] = Some("macron");
    t[0xC6 - 0x80] = Some("breve");
    t[0xC7 - 0x80] = Some("dotaccent");
    t[0xC8 - 0x80] = Some("dieresis");
    t[0xCA - 0x80] = Some("ring");
    t[0xCB - 0x80] = Some("cedilla");
    t[0xCD - 0x80] = Some("hungarumlaut");
    t[0xCE - 0x80] = Some("ogonek");
    t[0xCF - 0x80] = Some("caron");
    t[0xD0 - 0x80] = Some("emdash");
    t[0xE1 - 0x80] = Some("AE");
    t[0xE3 - 0x80] = Some("ordfeminine");
    t[0xE8 - 0x80] = Some("Lslash");
    t[0xE9 - 0x80] = Some("Oslash");
    t[0xEA - 0x80] = Some("OE");
    t[0xEB - 0x80] = Some("ordmasculine");
    t[0xF1 - 0x80] = Some("ae");
    t[0xF5 - 0x80] = Some("dotlessi");
    t[0xF8 - 0x80] = Some("lslash");
    t[0xF9 - 0x80] = Some("oslash");
    t[0xFA - 0x80] = Some("oe");
    t[0xFB - 0x80] = Some("germandbls");
    t
};

const WIN_ANSI_HIGH: [Option<&str>; 128] = [
    // 0x80
    Some("Euro"), None, Some("quotesinglbase"), Some("florin"),
    Some("quotedblbase"), Some("ellipsis"), Some("dagger"), Some("daggerdbl"),
    Some("circumflex"), Some("perthousand"), Some("Scaron"), Some("guilsinglleft"),
    Some("OE"), None, Some("Zcaron"), None,
    // 0x90
    None, Some("quoteleft"), Some("quoteright"), Some("quotedblleft"),
    Some("quotedblright"), Some("bullet"), Some("endash"), Some("emdash"),
    Some("tilde"), Some("trademark"), Some("scaron"), Some("guilsinglright"),
    Some("oe"), None, Some("zcaron"), Some("Ydieresis"),
    // 0xA0
    Some("space"), Some("exclamdown"), Some("cent"), Some("sterling"),
    Some("currency"), Some("yen"), Some("brokenbar"), Some("section"),
    Some("dieresis"), Some("copyright"), Some("ordfeminine"), Some("guillemotleft"),
    Some("logicalnot"), Some("hyphen"), Some("registered"), Some("macron"),
    // 0xB0
    Some("degree"), Some("plusminus"), Some("twosuperior"), Some("threesuperior"),
    Some("acute"), Some("mu"), Some("paragraph"), Some("periodcentered"),
    Some("cedilla"), Some("onesuperior"), Some("ordmasculine"), Some("guillemotright"),
    Some("onequarter"), Some("onehalf"), Some("threequarters"), Some("questiondown"),
    // 0xC0
    Some("Agrave"), Some("Aacute"), Some("Acircumflex"), Some("Atilde"),
    Some("Adieresis"), Some("Aring"), Some("AE"), Some("Ccedilla"),
    Some("Egrave"), Some("Eacute"), Some("Ecircumflex"), Some("Edieresis"),
    Some("Igrave"), Some("Iacute"), Some("Icircumflex"), Some("Idieresis"),
    // 0xD0
    Some("Eth"), Some("Ntilde"), Some("Ograve"), Some("Oacute"),
    Some("Ocircumflex"), Some("Otilde"), Some("Odieresis"), Some("multiply"),
    Some("Oslash"), Some("Ugrave"), Some("Uacute"), Some("Ucircumflex"),
    Some("Udieresis"), Some("Yacute"), Some("Thorn"), Some("germandbls"),
    // 0xE0
    Some("agrave"), Some("aacute"), Some("acircumflex"), Some("atilde"),
    Some("adieresis"), Some("aring"), Some("ae"), Some("ccedilla"),
    Some("egrave"), Some("eacute"), Some("ecircumflex"), Some("edieresis"),
    Some("igrave"), Some("iacute"), Some("icircumflex"), Some("idieresis"),
    // 0xF0
    Some("eth"), Some("ntilde"), Some("ograve"), Some("oacute"),
    Some("ocircumflex"), Some("otilde"), Some("odieresis"), Some("divide"),
    Some("oslash"), Some("ugrave"), Some("uacute"), Some("ucircumflex"),
    Some("udieresis"), Some("yacute"), Some("thorn"), Some("ydieresis"),
];

const MAC_ROMAN_HIGH: [Option<&str>; 128] = [
    // 0x80
    Some("Adieresis"), Some("Aring"), Some("Ccedilla"), Some("Eacute"),
    Some("Ntilde"), Some("Odieresis"), Some("Udieresis"), Some("aacute"),
    Some("agrave"), Some("acircumflex"), Some("adieresis"), Some("atilde"),
    Some("aring"), Some("ccedilla"), Some("eacute"), Some("egrave"),
    // 0x90
    Some("ecircumflex"), Some("edieresis"), Some("iacute"), Some("igrave"),
    Some("icircumflex"), Some("idieresis"), Some("ntilde"), Some("oacute"),
    Some("ograve"), Some("ocircumflex"), Some("odieresis"), Some("otilde"),
    Some("uacute"), Some("ugrave"), Some("ucircumflex"), Some("udieresis"),
    // 0xA0
    Some("dagger"), Some("degree"), Some("cent"), Some("sterling"),
    Some("section"), Some("bullet"), Some("paragraph"), Some("germandbls"),
    Some("registered"), Some("copyright"), Some("trademark"), Some("acute"),
    Some("dieresis"), Some("notequal"), Some("AE"), Some("Oslash"),
    // 0xB0
    Some("infinity"), Some("plusminus"), Some("lessequal"), Some("greaterequal"),
    Some("yen"), Some("mu"), Some("partialdiff"), Some("summation"),
    Some("product"), Some("pi"), Some("integral"), Some("ordfeminine"),
    Some("ordmasculine"), Some("Omega"), Some("ae"), Some("oslash"),
    // 0xC0
    Some("questiondown"), Some("exclamdown"), Some("logicalnot"), Some("radical"),
    Some("florin"), Some("approxequal"), Some("Delta"), Some("guillemotleft"),
    Some("guillemotright"), Some("ellipsis"), Some("space"), Some("Agrave"),
    Some("Atilde"), Some("Otilde"), Some("OE"), Some("oe"),
    // 0xD0
    Some("endash"), Some("emdash"), Some("quotedblleft"), Some("quotedblright"),
    Some("quoteleft"), Some("quoteright"), Some("divide"), Some("lozenge"),
    Some("ydieresis"), Some("Ydieresis"), Some("fraction"), Some("currency"),
    Some("guilsinglleft"), Some("guilsinglright"), Some("fi"), Some("fl"),
    // 0xE0
    Some("daggerdbl"), Some("periodcentered"), Some("quotesinglbase"), Some("quotedblbase"),
    Some("perthousand"), Some("Acircumflex"), Some("Ecircumflex"), Some("Aacute"),
    Some("Edieresis"), Some("Egrave"), Some("Iacute"), Some("Icircumflex"),
    Some("Idieresis"), Some("Igrave"), Some("Oacute"), Some("Ocircumflex"),
    // 0xF0
    Some("apple"), Some("Ograve"), Some("Uacute"), Some("Ucircumflex"),
    Some("Ugrave"), Some("dotlessi"), Some("circumflex"), Some("tilde"),
    Some("macron"), Some("breve"), Some("dotaccent"), Some("ring"),
    Some("cedilla"), Some("hungarumlaut"), Some("ogonek"), Some("caron"),
];

/// Windows-1252 code points for 0x80..=0x9F
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

/// Names outside WinAnsi that show up in Standard, MacRoman and Differences
const EXTRA_NAMES: &[(&str, &str)] = &[
    ("quoteright", "\u{2019}"),
    ("quoteleft", "\u{2018}"),
    ("fraction", "\u{2044}"),
    ("fi", "\u{FB01}"),
    ("fl", "\u{FB02}"),
    ("ff", "\u{FB00}"),
    ("ffi", "\u{FB03}"),
    ("ffl", "\u{FB04}"),
    ("dotlessi", "\u{0131}"),
    ("Lslash", "\u{0141}"),
    ("lslash", "\u{0142}"),
    ("breve", "\u{02D8}"),
    ("dotaccent", "\u{02D9}"),
    ("ring", "\u{02DA}"),
    ("ogonek", "\u{02DB}"),
    ("caron", "\u{02C7}"),
    ("hungarumlaut", "\u{02DD}"),
    ("notequal", "\u{2260}"),
    ("infinity", "\u{221E}"),
    ("lessequal", "\u{2264}"),
    ("greaterequal", "\u{2265}"),
    ("partialdiff", "\u{2202}"),
    ("summation", "\u{2211}"),
    ("product", "\u{220F}"),
    ("pi", "\u{03C0}"),
    ("integral", "\u{222B}"),
    ("Omega", "\u{2126}"),
    ("radical", "\u{221A}"),
    ("approxequal", "\u{2248}"),
    ("Delta", "\u{2206}"),
    ("lozenge", "\u{25CA}"),
    ("minus", "\u{2212}"),
    ("nbspace", "\u{00A0}"),
    ("sfthyphen", "\u{00AD}"),
];

/// Derive the Unicode text of a glyph name.
///
/// Handles the names of the three standard encodings, the common ligatures
/// and the `uniXXXX`/`uXXXX[XX]` conventions. Suffixes after a period
/// (`a.sc`, `one.oldstyle`) are ignored; underscore-joined components
/// (`f_f_i`) are concatenated.
pub fn glyph_name_to_unicode(name: &str) -> Option<String> {
    let base = name.split('.').next().unwrap_or(name);
    if base.is_empty() {
        return None;
    }
    if base.contains('_') {
        return base
            .split('_')
            .map(component_to_unicode)
            .collect::<Option<String>>();
    }
    component_to_unicode(base)
}

fn component_to_unicode(name: &str) -> Option<String> {
    if let Some(text) = known_name(name) {
        return Some(text);
    }
    if let Some(hex) = name.strip_prefix("uni") {
        if hex.len() >= 4 && hex.len() % 4 == 0 {
            return hex
                .as_bytes()
                .chunks(4)
                .map(|quad| {
                    let quad = std::str::from_utf8(quad).ok()?;
                    let value = u32::from_str_radix(quad, 16).ok()?;
                    char::from_u32(value)
                })
                .collect();
        }
    }
    if let Some(hex) = name.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            let value = u32::from_str_radix(hex, 16).ok()?;
            return char::from_u32(value).map(String::from);
        }
    }
    None
}

fn known_name(name: &str) -> Option<String> {
    if let Some(index) = ASCII_NAMES.iter().position(|n| *n == name) {
        return Some(char::from(0x20 + index as u8).to_string());
    }
    if let Some(index) = WIN_ANSI_HIGH.iter().position(|n| *n == Some(name)) {
        let code = 0x80 + index;
        // "space" and "hyphen" also sit at 0xA0/0xAD; ASCII wins above
        let ch = if code < 0xA0 {
            CP1252_HIGH[code - 0x80]?
        } else {
            char::from(code as u8)
        };
        return Some(ch.to_string());
    }
    EXTRA_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, text)| text.to_string())
}
