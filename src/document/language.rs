/// Languages we can analyze; the first entry is the fallback
const SUPPORTED: &[&str] = &[
    "en", "ar", "bg", "ca", "cs", "da", "de", "el", "en-us", "en-gb", "es", "es-es", "es-419",
    "fa", "fi", "fr", "fr-ca", "hi", "hu", "hy", "id", "it", "ja", "ko", "lt", "lv", "nl", "no",
    "pt", "pt-br", "pt-pt", "ro", "ru", "sv", "th", "tr", "vi", "zh", "zh-hans", "zh-hant",
];

/// Maps an html `lang` attribute onto a supported language tag
///
/// An exact tag wins, then its primary subtag, then the fallback.
pub fn match_language(lang: Option<&str>) -> &'static str {
    let fallback = SUPPORTED[0];
    let Some(lang) = lang else {
        return fallback;
    };

    let tag = lang.trim().to_lowercase().replace('_', "-");
    if let Some(found) = SUPPORTED.iter().copied().find(|s| *s == tag) {
        return found;
    }

    let primary = tag.split('-').next().unwrap_or_default();
    SUPPORTED
        .iter()
        .copied()
        .find(|s| *s == primary)
        .unwrap_or(fallback)
}
