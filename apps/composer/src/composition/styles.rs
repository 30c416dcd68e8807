//! Global style derivation from aesthetic descriptors and reference palettes.

use crate::composition::models::{ColorScheme, FontScheme, GlobalStyles};
use crate::composition::request::{Palette, ReferenceAnalysis, Spacing, StyleInheritance};

struct Theme {
    colors: [&'static str; 6],
    dark: bool,
}

/// Base palettes as `[primary, secondary, accent, background, foreground, muted]`.
fn theme_for(words: &[String]) -> Theme {
    for word in words {
        let theme = match word.as_str() {
            "dark" | "technical" | "developer" | "cyber" | "neon" => Theme {
                colors: ["#6366f1", "#1f2937", "#22d3ee", "#0b0d12", "#e6e8ee", "#8a93a6"],
                dark: true,
            },
            "minimal" | "clean" | "light" | "simple" => Theme {
                colors: ["#111827", "#f3f4f6", "#2563eb", "#ffffff", "#111827", "#6b7280"],
                dark: false,
            },
            "playful" | "friendly" | "colorful" | "fun" => Theme {
                colors: ["#f43f5e", "#fde68a", "#8b5cf6", "#fffbf5", "#1f2937", "#6b7280"],
                dark: false,
            },
            "luxury" | "elegant" | "premium" => Theme {
                colors: ["#1c1917", "#e7e5e4", "#b45309", "#fafaf9", "#1c1917", "#78716c"],
                dark: false,
            },
            "bold" | "brutalist" => Theme {
                colors: ["#000000", "#facc15", "#ef4444", "#ffffff", "#000000", "#525252"],
                dark: false,
            },
            _ => continue,
        };
        return theme;
    }
    Theme {
        colors: ["#2563eb", "#e0e7ff", "#f59e0b", "#ffffff", "#0f172a", "#64748b"],
        dark: false,
    }
}

fn fonts_for(words: &[String]) -> FontScheme {
    let (heading, body) = words
        .iter()
        .find_map(|w| match w.as_str() {
            "technical" | "developer" | "dark" => Some(("Space Grotesk", "Inter")),
            "elegant" | "luxury" | "premium" | "editorial" => Some(("Playfair Display", "Inter")),
            "playful" | "friendly" | "fun" => Some(("Poppins", "Nunito")),
            "bold" | "brutalist" => Some(("Archivo Black", "Archivo")),
            _ => None,
        })
        .unwrap_or(("Inter", "Inter"));

    FontScheme {
        heading: heading.to_string(),
        body: body.to_string(),
        mono: "JetBrains Mono".to_string(),
    }
}

fn spacing_for(words: &[String]) -> Spacing {
    words
        .iter()
        .find_map(|w| match w.as_str() {
            "minimal" | "luxury" | "elegant" | "spacious" | "airy" => Some(Spacing::Spacious),
            "dense" | "compact" | "data" | "dashboard" => Some(Spacing::Compact),
            _ => None,
        })
        .unwrap_or_default()
}

fn radius_for(words: &[String]) -> &'static str {
    words
        .iter()
        .find_map(|w| match w.as_str() {
            "brutalist" => Some("0px"),
            "minimal" | "technical" => Some("4px"),
            "playful" | "friendly" | "fun" => Some("16px"),
            _ => None,
        })
        .unwrap_or("8px")
}

/// Derives project-wide styles.
///
/// `Inherit` copies the first reference palette, `Blend` takes reference
/// primary/accent over the aesthetic base, `Fresh` ignores references.
/// Reference colors that are not `#rgb`/`#rrggbb` are ignored.
pub fn derive_styles(
    aesthetic: &[String],
    references: &[ReferenceAnalysis],
    mode: StyleInheritance,
) -> GlobalStyles {
    let mut words = descriptor_words(aesthetic.iter().map(String::as_str));
    if mode != StyleInheritance::Fresh {
        words.extend(descriptor_words(
            references.iter().filter_map(|r| r.aesthetic.as_deref()),
        ));
    }

    let theme = theme_for(&words);
    let [primary, secondary, accent, background, foreground, muted] = theme.colors.map(str::to_string);
    let mut colors = ColorScheme {
        primary,
        secondary,
        accent,
        background,
        foreground,
        muted,
    };

    match mode {
        StyleInheritance::Fresh => {}
        StyleInheritance::Blend => {
            let palettes: Vec<&Palette> = references.iter().map(|r| &r.palette).collect();
            if let Some(primary) = first_color(&palettes, |p| &p.primary) {
                colors.primary = primary;
            }
            if let Some(accent) = first_color(&palettes, |p| &p.accent) {
                colors.accent = accent;
            }
        }
        StyleInheritance::Inherit => {
            if let Some(palette) = references.first().map(|r| &r.palette) {
                let fields = [
                    (&palette.primary, &mut colors.primary),
                    (&palette.secondary, &mut colors.secondary),
                    (&palette.accent, &mut colors.accent),
                    (&palette.background, &mut colors.background),
                    (&palette.foreground, &mut colors.foreground),
                ];
                for (source, target) in fields {
                    if let Some(color) = source.as_deref().and_then(normalize_hex) {
                        *target = color;
                    }
                }
            }
        }
    }

    let dark_mode = is_dark(&colors.background).unwrap_or(theme.dark);
    GlobalStyles {
        colors,
        fonts: fonts_for(&words),
        spacing: spacing_for(&words),
        border_radius: radius_for(&words).to_string(),
        dark_mode,
    }
}

fn first_color(palettes: &[&Palette], field: impl Fn(&Palette) -> &Option<String>) -> Option<String> {
    palettes
        .iter()
        .find_map(|p| field(p).as_deref().and_then(normalize_hex))
}

fn descriptor_words<'a>(sources: impl Iterator<Item = &'a str>) -> Vec<String> {
    sources
        .flat_map(|s| s.split(|c: char| !c.is_alphanumeric() && c != '-'))
        .map(|w| w.trim_matches('-').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Lowercased `#rrggbb`, expanding `#rgb`. Anything else is rejected.
fn normalize_hex(raw: &str) -> Option<String> {
    let hex = raw.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => Some(format!("#{}", hex.to_lowercase())),
        3 => Some(format!(
            "#{}",
            hex.chars().flat_map(|c| [c, c]).collect::<String>().to_lowercase()
        )),
        _ => None,
    }
}

/// Relative luminance below 0.4 counts as dark.
fn is_dark(hex: &str) -> Option<bool> {
    let hex = normalize_hex(hex)?;
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok().map(|v| f32::from(v) / 255.0);
    let (r, g, b) = (channel(1)?, channel(3)?, channel(5)?);
    Some(0.2126 * r + 0.7152 * g + 0.0722 * b < 0.4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(primary: &str, background: &str, aesthetic: &str) -> ReferenceAnalysis {
        ReferenceAnalysis {
            url: Some("https://example.com".to_string()),
            aesthetic: Some(aesthetic.to_string()),
            layout: None,
            palette: Palette {
                primary: Some(primary.to_string()),
                background: Some(background.to_string()),
                ..Palette::default()
            },
        }
    }

    #[test]
    fn test_fresh_ignores_references() {
        let styles = derive_styles(
            &["dark".to_string()],
            &[reference("#ff0000", "#ffffff", "playful")],
            StyleInheritance::Fresh,
        );
        assert_eq!(styles.colors.primary, "#6366f1");
        assert!(styles.dark_mode);
        assert_eq!(styles.fonts.heading, "Space Grotesk");
    }

    #[test]
    fn test_inherit_copies_reference_palette() {
        let styles = derive_styles(
            &["dark".to_string()],
            &[reference("#F00", "#ffffff", "minimal")],
            StyleInheritance::Inherit,
        );
        assert_eq!(styles.colors.primary, "#ff0000");
        assert_eq!(styles.colors.background, "#ffffff");
        assert!(!styles.dark_mode);
    }

    #[test]
    fn test_blend_takes_reference_primary_only() {
        let styles = derive_styles(
            &["minimal".to_string()],
            &[reference("#123456", "#000000", "")],
            StyleInheritance::Blend,
        );
        assert_eq!(styles.colors.primary, "#123456");
        assert_eq!(styles.colors.background, "#ffffff");
        assert_eq!(styles.spacing, Spacing::Spacious);
    }

    #[test]
    fn test_invalid_reference_colors_are_ignored() {
        let styles = derive_styles(
            &[],
            &[reference("red; background: url(x)", "#zzzzzz", "")],
            StyleInheritance::Inherit,
        );
        assert_eq!(styles.colors.primary, "#2563eb");
        assert_eq!(styles.colors.background, "#ffffff");
    }

    #[test]
    fn test_defaults_without_descriptors() {
        let styles = derive_styles(&[], &[], StyleInheritance::Blend);
        assert_eq!(styles.spacing, Spacing::Comfortable);
        assert_eq!(styles.border_radius, "8px");
        assert_eq!(styles.fonts.heading, "Inter");
    }

    #[test]
    fn test_dark_detection() {
        assert_eq!(is_dark("#0b0d12"), Some(true));
        assert_eq!(is_dark("#fff"), Some(false));
        assert_eq!(is_dark("blue"), None);
    }
}
