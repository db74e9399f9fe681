//! 语言代码规范化.
//!
//! 容器与广播描述子里的语言既可能是 ISO-639-1 两字母代码,
//! 也可能是 ISO-639-2 的书目代码或术语代码 (如 `ger` / `deu`).
//! 选轨时只比较规范化后的三字母键.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 两字母代码到三字母代码
const ISO639_1_TO_2: &[(&str, &str)] = &[
    ("ar", "ara"),
    ("bg", "bul"),
    ("ca", "cat"),
    ("cs", "ces"),
    ("cy", "cym"),
    ("da", "dan"),
    ("de", "deu"),
    ("el", "ell"),
    ("en", "eng"),
    ("es", "spa"),
    ("et", "est"),
    ("eu", "eus"),
    ("fa", "fas"),
    ("fi", "fin"),
    ("fr", "fra"),
    ("ga", "gle"),
    ("he", "heb"),
    ("hi", "hin"),
    ("hr", "hrv"),
    ("hu", "hun"),
    ("is", "isl"),
    ("it", "ita"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("lt", "lit"),
    ("lv", "lav"),
    ("nl", "nld"),
    ("no", "nor"),
    ("pl", "pol"),
    ("pt", "por"),
    ("ro", "ron"),
    ("ru", "rus"),
    ("sk", "slk"),
    ("sl", "slv"),
    ("sr", "srp"),
    ("sv", "swe"),
    ("th", "tha"),
    ("tr", "tur"),
    ("uk", "ukr"),
    ("vi", "vie"),
    ("zh", "zho"),
];

/// 书目代码到术语代码
const BIBLIOGRAPHIC_TO_TERMINOLOGY: &[(&str, &str)] = &[
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("dut", "nld"),
    ("fre", "fra"),
    ("geo", "kat"),
    ("ger", "deu"),
    ("gre", "ell"),
    ("ice", "isl"),
    ("mac", "mkd"),
    ("mao", "mri"),
    ("may", "msa"),
    ("per", "fas"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("tib", "bod"),
    ("wel", "cym"),
];

/// 常见语言的显示名称
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("ara", "Arabic"),
    ("ces", "Czech"),
    ("dan", "Danish"),
    ("deu", "German"),
    ("ell", "Greek"),
    ("eng", "English"),
    ("fin", "Finnish"),
    ("fra", "French"),
    ("heb", "Hebrew"),
    ("hun", "Hungarian"),
    ("ita", "Italian"),
    ("jpn", "Japanese"),
    ("kor", "Korean"),
    ("nld", "Dutch"),
    ("nor", "Norwegian"),
    ("pol", "Polish"),
    ("por", "Portuguese"),
    ("rus", "Russian"),
    ("spa", "Spanish"),
    ("swe", "Swedish"),
    ("tur", "Turkish"),
    ("zho", "Chinese"),
];

/// 规范化的三字母语言键
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LanguageKey([u8; 3]);

impl LanguageKey {
    /// 未定义语言 ("und")
    pub const UNDEFINED: Self = Self(*b"und");

    /// 从任意语言代码构造规范键
    ///
    /// 空串或单字符视为未定义; 两字母按 ISO-639-1 映射;
    /// 三字母以上取前三个字符, 书目代码换成术语代码. 无法识别的代码原样保留.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_ascii_lowercase();
        if !code.is_ascii() {
            return Self::UNDEFINED;
        }
        match code.len() {
            0 | 1 => Self::UNDEFINED,
            2 => ISO639_1_TO_2
                .iter()
                .find(|(two, _)| *two == code)
                .map(|(_, three)| Self::from_three(three))
                .unwrap_or(Self::UNDEFINED),
            _ => {
                let three = &code[..3];
                let canonical = BIBLIOGRAPHIC_TO_TERMINOLOGY
                    .iter()
                    .find(|(bib, _)| *bib == three)
                    .map(|(_, term)| *term)
                    .unwrap_or(three);
                Self::from_three(canonical)
            }
        }
    }

    fn from_three(code: &str) -> Self {
        let b = code.as_bytes();
        if b.len() < 3 || !b[..3].iter().all(u8::is_ascii_alphabetic) {
            return Self::UNDEFINED;
        }
        Self([b[0], b[1], b[2]])
    }

    /// 是否为未定义语言
    pub fn is_undefined(&self) -> bool {
        *self == Self::UNDEFINED
    }

    /// 三字母代码
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("und")
    }

    /// 显示名称, 不认识的语言返回代码本身
    pub fn name(&self) -> &str {
        if self.is_undefined() {
            return "Unknown";
        }
        LANGUAGE_NAMES
            .iter()
            .find(|(code, _)| *code == self.as_str())
            .map(|(_, name)| *name)
            .unwrap_or_else(|| self.as_str())
    }
}

impl Default for LanguageKey {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl From<String> for LanguageKey {
    fn from(code: String) -> Self {
        Self::from_code(&code)
    }
}

impl From<&str> for LanguageKey {
    fn from(code: &str) -> Self {
        Self::from_code(code)
    }
}

impl From<LanguageKey> for String {
    fn from(key: LanguageKey) -> Self {
        key.as_str().to_string()
    }
}

impl fmt::Display for LanguageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for LanguageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LanguageKey({})", self.as_str())
    }
}
