use crate::core::interfaces::StyleTransform;
use crate::core::models::UtilitiesConfig;
use crate::utils::{Logger, Result, TailpackError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const STAGE: &str = "utilities";

static TAILWIND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@tailwind\s+([a-z-]+)\s*;").expect("valid @tailwind pattern"));
static APPLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@apply\s+([^;}]+);?").expect("valid @apply pattern"));
static CANDIDATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9_:/.\-]+").expect("valid candidate pattern"));

const PREFLIGHT: &str = r#"*, ::before, ::after {
  box-sizing: border-box;
  border-width: 0;
  border-style: solid;
  border-color: #e5e7eb;
}
html {
  line-height: 1.5;
  font-family: ui-sans-serif, system-ui, -apple-system, "Segoe UI", Roboto, sans-serif;
}
body {
  margin: 0;
  line-height: inherit;
}
h1, h2, h3, h4, h5, h6 {
  font-size: inherit;
  font-weight: inherit;
}
a {
  color: inherit;
  text-decoration: inherit;
}
button, input, select, textarea {
  font: inherit;
  color: inherit;
  margin: 0;
}
img, svg, video {
  display: block;
  max-width: 100%;
}
"#;

const SPACING_SCALE: &[&str] = &[
    "0", "0.5", "1", "1.5", "2", "2.5", "3", "3.5", "4", "5", "6", "7", "8", "9", "10", "11",
    "12", "14", "16", "20", "24", "28", "32", "36", "40", "44", "48", "52", "56", "60", "64",
    "72", "80", "96",
];

const SHADES: [&str; 10] = ["50", "100", "200", "300", "400", "500", "600", "700", "800", "900"];

const PALETTE: &[(&str, [&str; 10])] = &[
    ("gray", ["#f9fafb", "#f3f4f6", "#e5e7eb", "#d1d5db", "#9ca3af", "#6b7280", "#4b5563", "#374151", "#1f2937", "#111827"]),
    ("red", ["#fef2f2", "#fee2e2", "#fecaca", "#fca5a5", "#f87171", "#ef4444", "#dc2626", "#b91c1c", "#991b1b", "#7f1d1d"]),
    ("yellow", ["#fffbeb", "#fef3c7", "#fde68a", "#fcd34d", "#fbbf24", "#f59e0b", "#d97706", "#b45309", "#92400e", "#78350f"]),
    ("green", ["#ecfdf5", "#d1fae5", "#a7f3d0", "#6ee7b7", "#34d399", "#10b981", "#059669", "#047857", "#065f46", "#064e3b"]),
    ("blue", ["#eff6ff", "#dbeafe", "#bfdbfe", "#93c5fd", "#60a5fa", "#3b82f6", "#2563eb", "#1d4ed8", "#1e40af", "#1e3a8a"]),
    ("indigo", ["#eef2ff", "#e0e7ff", "#c7d2fe", "#a5b4fc", "#818cf8", "#6366f1", "#4f46e5", "#4338ca", "#3730a3", "#312e81"]),
    ("purple", ["#f5f3ff", "#ede9fe", "#ddd6fe", "#c4b5fd", "#a78bfa", "#8b5cf6", "#7c3aed", "#6d28d9", "#5b21b6", "#4c1d95"]),
    ("pink", ["#fdf2f8", "#fce7f3", "#fbcfe8", "#f9a8d4", "#f472b6", "#ec4899", "#db2777", "#be185d", "#9d174d", "#831843"]),
];

/// Responsive variants in cascade order
const SCREENS: &[(&str, &str)] = &[
    ("sm", "640px"),
    ("md", "768px"),
    ("lg", "1024px"),
    ("xl", "1280px"),
];

const PSEUDO_VARIANTS: &[&str] = &["hover", "focus", "active"];

type Declarations = Vec<(String, String)>;

fn decls(pairs: &[(&str, &str)]) -> Declarations {
    pairs
        .iter()
        .map(|(p, v)| (p.to_string(), v.to_string()))
        .collect()
}

fn static_utility(class: &str) -> Option<Declarations> {
    let pairs: &[(&str, &str)] = match class {
        "block" => &[("display", "block")],
        "inline-block" => &[("display", "inline-block")],
        "inline" => &[("display", "inline")],
        "flex" => &[("display", "flex")],
        "inline-flex" => &[("display", "inline-flex")],
        "grid" => &[("display", "grid")],
        "contents" => &[("display", "contents")],
        "hidden" => &[("display", "none")],
        "flex-row" => &[("flex-direction", "row")],
        "flex-col" => &[("flex-direction", "column")],
        "flex-wrap" => &[("flex-wrap", "wrap")],
        "flex-1" => &[("flex", "1 1 0%")],
        "flex-auto" => &[("flex", "1 1 auto")],
        "flex-none" => &[("flex", "none")],
        "grow" => &[("flex-grow", "1")],
        "shrink-0" => &[("flex-shrink", "0")],
        "items-start" => &[("align-items", "flex-start")],
        "items-center" => &[("align-items", "center")],
        "items-end" => &[("align-items", "flex-end")],
        "items-stretch" => &[("align-items", "stretch")],
        "items-baseline" => &[("align-items", "baseline")],
        "justify-start" => &[("justify-content", "flex-start")],
        "justify-center" => &[("justify-content", "center")],
        "justify-end" => &[("justify-content", "flex-end")],
        "justify-between" => &[("justify-content", "space-between")],
        "justify-around" => &[("justify-content", "space-around")],
        "justify-evenly" => &[("justify-content", "space-evenly")],
        "self-center" => &[("align-self", "center")],
        "static" => &[("position", "static")],
        "relative" => &[("position", "relative")],
        "absolute" => &[("position", "absolute")],
        "fixed" => &[("position", "fixed")],
        "sticky" => &[("position", "sticky")],
        "overflow-hidden" => &[("overflow", "hidden")],
        "overflow-auto" => &[("overflow", "auto")],
        "overflow-scroll" => &[("overflow", "scroll")],
        "truncate" => &[
            ("overflow", "hidden"),
            ("text-overflow", "ellipsis"),
            ("white-space", "nowrap"),
        ],
        "uppercase" => &[("text-transform", "uppercase")],
        "lowercase" => &[("text-transform", "lowercase")],
        "capitalize" => &[("text-transform", "capitalize")],
        "italic" => &[("font-style", "italic")],
        "underline" => &[("text-decoration-line", "underline")],
        "no-underline" => &[("text-decoration-line", "none")],
        "text-left" => &[("text-align", "left")],
        "text-center" => &[("text-align", "center")],
        "text-right" => &[("text-align", "right")],
        "text-justify" => &[("text-align", "justify")],
        "font-thin" => &[("font-weight", "100")],
        "font-light" => &[("font-weight", "300")],
        "font-normal" => &[("font-weight", "400")],
        "font-medium" => &[("font-weight", "500")],
        "font-semibold" => &[("font-weight", "600")],
        "font-bold" => &[("font-weight", "700")],
        "font-extrabold" => &[("font-weight", "800")],
        "font-black" => &[("font-weight", "900")],
        "leading-none" => &[("line-height", "1")],
        "leading-tight" => &[("line-height", "1.25")],
        "leading-normal" => &[("line-height", "1.5")],
        "leading-loose" => &[("line-height", "2")],
        "tracking-tight" => &[("letter-spacing", "-0.025em")],
        "tracking-wide" => &[("letter-spacing", "0.025em")],
        "cursor-pointer" => &[("cursor", "pointer")],
        "cursor-not-allowed" => &[("cursor", "not-allowed")],
        "pointer-events-none" => &[("pointer-events", "none")],
        "select-none" => &[("user-select", "none")],
        "select-text" => &[("user-select", "text")],
        "select-all" => &[("user-select", "all")],
        "appearance-none" => &[("appearance", "none")],
        "rounded-none" => &[("border-radius", "0px")],
        "rounded-sm" => &[("border-radius", "0.125rem")],
        "rounded" => &[("border-radius", "0.25rem")],
        "rounded-md" => &[("border-radius", "0.375rem")],
        "rounded-lg" => &[("border-radius", "0.5rem")],
        "rounded-xl" => &[("border-radius", "0.75rem")],
        "rounded-2xl" => &[("border-radius", "1rem")],
        "rounded-full" => &[("border-radius", "9999px")],
        "border" => &[("border-width", "1px")],
        "border-0" => &[("border-width", "0px")],
        "border-2" => &[("border-width", "2px")],
        "border-4" => &[("border-width", "4px")],
        "border-8" => &[("border-width", "8px")],
        "shadow-sm" => &[("box-shadow", "0 1px 2px 0 rgba(0, 0, 0, 0.05)")],
        "shadow" => &[(
            "box-shadow",
            "0 1px 3px 0 rgba(0, 0, 0, 0.1), 0 1px 2px 0 rgba(0, 0, 0, 0.06)",
        )],
        "shadow-md" => &[(
            "box-shadow",
            "0 4px 6px -1px rgba(0, 0, 0, 0.1), 0 2px 4px -1px rgba(0, 0, 0, 0.06)",
        )],
        "shadow-lg" => &[(
            "box-shadow",
            "0 10px 15px -3px rgba(0, 0, 0, 0.1), 0 4px 6px -2px rgba(0, 0, 0, 0.05)",
        )],
        "shadow-none" => &[("box-shadow", "none")],
        "transition" => &[
            ("transition-property", "color, background-color, border-color, opacity, box-shadow, transform"),
            ("transition-timing-function", "cubic-bezier(0.4, 0, 0.2, 1)"),
            ("transition-duration", "150ms"),
        ],
        "sr-only" => &[
            ("position", "absolute"),
            ("width", "1px"),
            ("height", "1px"),
            ("padding", "0"),
            ("margin", "-1px"),
            ("overflow", "hidden"),
            ("clip", "rect(0, 0, 0, 0)"),
            ("white-space", "nowrap"),
            ("border-width", "0"),
        ],
        "min-h-screen" => &[("min-height", "100vh")],
        "inset-0" => &[("top", "0px"), ("right", "0px"), ("bottom", "0px"), ("left", "0px")],
        _ => return None,
    };
    Some(decls(pairs))
}

fn spacing_value(raw: &str) -> Option<String> {
    if raw == "px" {
        return Some("1px".to_string());
    }
    if !SPACING_SCALE.contains(&raw) {
        return None;
    }
    let steps: f64 = raw.parse().ok()?;
    if steps == 0.0 {
        return Some("0px".to_string());
    }
    Some(format!("{}rem", steps * 0.25))
}

fn size_value(raw: &str, axis_screen: &str) -> Option<String> {
    match raw {
        "full" => Some("100%".to_string()),
        "screen" => Some(axis_screen.to_string()),
        "auto" => Some("auto".to_string()),
        "min" => Some("min-content".to_string()),
        "max" => Some("max-content".to_string()),
        "1/2" => Some("50%".to_string()),
        "1/3" => Some("33.333333%".to_string()),
        "2/3" => Some("66.666667%".to_string()),
        "1/4" => Some("25%".to_string()),
        "3/4" => Some("75%".to_string()),
        _ => spacing_value(raw),
    }
}

fn color_value(raw: &str) -> Option<String> {
    match raw {
        "white" => return Some("#fff".to_string()),
        "black" => return Some("#000".to_string()),
        "transparent" => return Some("transparent".to_string()),
        "current" => return Some("currentColor".to_string()),
        _ => {}
    }
    let (name, shade) = raw.rsplit_once('-')?;
    let (_, shades) = PALETTE.iter().find(|(n, _)| *n == name)?;
    let idx = SHADES.iter().position(|s| *s == shade)?;
    Some(shades[idx].to_string())
}

fn text_size(raw: &str) -> Option<Declarations> {
    let (size, line) = match raw {
        "xs" => ("0.75rem", "1rem"),
        "sm" => ("0.875rem", "1.25rem"),
        "base" => ("1rem", "1.5rem"),
        "lg" => ("1.125rem", "1.75rem"),
        "xl" => ("1.25rem", "1.75rem"),
        "2xl" => ("1.5rem", "2rem"),
        "3xl" => ("1.875rem", "2.25rem"),
        "4xl" => ("2.25rem", "2.5rem"),
        "5xl" => ("3rem", "1"),
        "6xl" => ("3.75rem", "1"),
        _ => return None,
    };
    Some(decls(&[("font-size", size), ("line-height", line)]))
}

fn max_width(raw: &str) -> Option<&'static str> {
    Some(match raw {
        "xs" => "20rem",
        "sm" => "24rem",
        "md" => "28rem",
        "lg" => "32rem",
        "xl" => "36rem",
        "2xl" => "42rem",
        "3xl" => "48rem",
        "4xl" => "56rem",
        "5xl" => "64rem",
        "6xl" => "72rem",
        "7xl" => "80rem",
        "full" => "100%",
        "none" => "none",
        _ => return None,
    })
}

fn spacing_properties(prefix: &str) -> Option<&'static [&'static str]> {
    let properties: &'static [&'static str] = match prefix {
        "p" => &["padding"],
        "px" => &["padding-left", "padding-right"],
        "py" => &["padding-top", "padding-bottom"],
        "pt" => &["padding-top"],
        "pr" => &["padding-right"],
        "pb" => &["padding-bottom"],
        "pl" => &["padding-left"],
        "m" => &["margin"],
        "mx" => &["margin-left", "margin-right"],
        "my" => &["margin-top", "margin-bottom"],
        "mt" => &["margin-top"],
        "mr" => &["margin-right"],
        "mb" => &["margin-bottom"],
        "ml" => &["margin-left"],
        "gap" => &["gap"],
        "gap-x" => &["column-gap"],
        "gap-y" => &["row-gap"],
        "top" => &["top"],
        "right" => &["right"],
        "bottom" => &["bottom"],
        "left" => &["left"],
        _ => return None,
    };
    Some(properties)
}

/// Declarations of a built-in utility class (no variants).
fn builtin_utility(class: &str) -> Option<Declarations> {
    if let Some(found) = static_utility(class) {
        return Some(found);
    }

    let (negative, class) = match class.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, class),
    };

    // Longest prefix first so `gap-x-2` is not read as `gap` + `x-2`
    let mut split_points: Vec<usize> = class.match_indices('-').map(|(i, _)| i).collect();
    split_points.reverse();
    for idx in split_points {
        let (prefix, value) = (&class[..idx], &class[idx + 1..]);

        if let Some(props) = spacing_properties(prefix) {
            let margin = prefix.starts_with('m');
            let value = if margin && value == "auto" && !negative {
                "auto".to_string()
            } else {
                let v = spacing_value(value)?;
                if negative {
                    if !margin && !["top", "right", "bottom", "left"].contains(&prefix) {
                        return None;
                    }
                    format!("-{}", v)
                } else {
                    v
                }
            };
            return Some(props.iter().map(|p| (p.to_string(), value.clone())).collect());
        }

        if negative {
            continue;
        }

        let found = match prefix {
            "w" => size_value(value, "100vw").map(|v| vec![("width".to_string(), v)]),
            "h" => size_value(value, "100vh").map(|v| vec![("height".to_string(), v)]),
            "max-w" => max_width(value).map(|v| decls(&[("max-width", v)])),
            "text" => text_size(value)
                .or_else(|| color_value(value).map(|c| vec![("color".to_string(), c)])),
            "bg" => color_value(value).map(|c| vec![("background-color".to_string(), c)]),
            "border" => color_value(value).map(|c| vec![("border-color".to_string(), c)]),
            "opacity" => value
                .parse::<u32>()
                .ok()
                .filter(|v| *v <= 100 && v % 5 == 0)
                .map(|v| vec![("opacity".to_string(), format!("{}", v as f64 / 100.0))]),
            "z" => ["0", "10", "20", "30", "40", "50"]
                .contains(&value)
                .then(|| vec![("z-index".to_string(), value.to_string())]),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }

    None
}

fn parse_declarations(source: &str) -> Declarations {
    source
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let (prop, value) = (prop.trim(), value.trim());
            (!prop.is_empty() && !value.is_empty()).then(|| (prop.to_string(), value.to_string()))
        })
        .collect()
}

fn render_declarations(declarations: &Declarations, indent: &str) -> String {
    declarations
        .iter()
        .map(|(p, v)| format!("{}{}: {};", indent, p, v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape a class name for use in a selector.
pub fn escape_class(class: &str) -> String {
    let mut escaped = String::with_capacity(class.len() + 4);
    for (i, c) in class.chars().enumerate() {
        if i == 0 && c.is_ascii_digit() {
            escaped.push_str(&format!("\\3{} ", c));
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            escaped.push(c);
        } else {
            escaped.push('\\');
            escaped.push(c);
        }
    }
    escaped
}

/// A utility candidate split into its variants and base class
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    class: String,
    screen: Option<usize>,
    pseudo: Option<&'static str>,
    declarations: Declarations,
}

impl Candidate {
    /// Cascade order: plain utilities, then pseudo variants, then each screen.
    fn sort_key(&self) -> (usize, usize, String) {
        (
            self.screen.map(|s| s + 1).unwrap_or(0),
            usize::from(self.pseudo.is_some()),
            self.class.clone(),
        )
    }

    fn rule(&self) -> String {
        let mut selector = format!(".{}", escape_class(&self.class));
        if let Some(pseudo) = self.pseudo {
            selector.push(':');
            selector.push_str(pseudo);
        }
        format!("{} {{\n{}\n}}\n", selector, render_declarations(&self.declarations, "  "))
    }
}

/// Expands `@tailwind` directives and `@apply` into plain CSS
pub struct UtilityClassTransform {
    root: PathBuf,
    config: UtilitiesConfig,
}

impl UtilityClassTransform {
    pub fn new(root: &Path, config: UtilitiesConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
        }
    }

    /// Declarations for a base utility, custom utilities taking precedence.
    pub fn lookup(&self, class: &str) -> Option<Vec<(String, String)>> {
        if let Some(custom) = self.config.custom.get(class) {
            return Some(parse_declarations(custom));
        }
        builtin_utility(class)
    }

    fn parse_candidate(&self, token: &str) -> Option<Candidate> {
        let mut parts: Vec<&str> = token.split(':').collect();
        let base = parts.pop()?;
        let declarations = self.lookup(base)?;

        let mut screen = None;
        let mut pseudo = None;
        for variant in parts {
            if let Some(idx) = SCREENS.iter().position(|(name, _)| *name == variant) {
                if screen.replace(idx).is_some() {
                    return None;
                }
            } else if let Some(p) = PSEUDO_VARIANTS.iter().find(|p| **p == variant) {
                if pseudo.replace(*p).is_some() {
                    return None;
                }
            } else {
                return None;
            }
        }

        Some(Candidate {
            class: token.to_string(),
            screen,
            pseudo,
            declarations,
        })
    }

    /// Class candidates found in the configured content files, sorted.
    pub fn scan_content(&self) -> BTreeSet<String> {
        let mut tokens = BTreeSet::new();

        for pattern in &self.config.content {
            let full = self.root.join(pattern);
            let Ok(paths) = glob::glob(&full.to_string_lossy()) else {
                Logger::warn(&format!("Invalid content pattern: {}", pattern));
                continue;
            };
            for path in paths.flatten() {
                let Ok(text) = std::fs::read_to_string(&path) else {
                    continue;
                };
                for m in CANDIDATE_RE.find_iter(&text) {
                    tokens.insert(m.as_str().trim_end_matches(['.', ':', '/']).to_string());
                }
            }
        }

        tokens
    }

    fn utilities_layer(&self) -> String {
        let mut candidates: Vec<Candidate> = self
            .scan_content()
            .iter()
            .filter_map(|token| self.parse_candidate(token))
            .collect();
        candidates.sort_by_key(Candidate::sort_key);

        let mut css = String::new();
        let mut open_screen: Option<usize> = None;
        for candidate in &candidates {
            if candidate.screen != open_screen {
                if open_screen.is_some() {
                    css.push_str("}\n");
                }
                if let Some(idx) = candidate.screen {
                    css.push_str(&format!("@media (min-width: {}) {{\n", SCREENS[idx].1));
                }
                open_screen = candidate.screen;
            }
            css.push_str(&candidate.rule());
        }
        if open_screen.is_some() {
            css.push_str("}\n");
        }
        css
    }

    fn components_layer(&self, asset: &Path) -> Result<String> {
        let mut css = String::new();
        for (selector, classes) in &self.config.components {
            let body = self.expand_apply(asset, classes)?;
            css.push_str(&format!("{} {{\n{}\n}}\n", selector, render_declarations(&body, "  ")));
        }
        Ok(css)
    }

    fn expand_apply(&self, asset: &Path, classes: &str) -> Result<Declarations> {
        let mut out = Vec::new();
        for class in classes.split_whitespace() {
            if class.contains(':') {
                return Err(TailpackError::transform(
                    asset,
                    STAGE,
                    format!("variant class '{}' cannot be used with @apply", class),
                ));
            }
            let found = self.lookup(class).ok_or_else(|| {
                TailpackError::transform(
                    asset,
                    STAGE,
                    format!("@apply of unknown utility class '{}'", class),
                )
            })?;
            out.extend(found);
        }
        Ok(out)
    }
}

impl StyleTransform for UtilityClassTransform {
    fn name(&self) -> &'static str {
        STAGE
    }

    fn apply(&self, asset: &Path, css: &str) -> Result<String> {
        let mut expanded = String::with_capacity(css.len());
        let mut cursor = 0;
        for caps in TAILWIND_RE.captures_iter(css) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            expanded.push_str(&css[cursor..whole.start]);
            let layer = match &caps[1] {
                "base" => PREFLIGHT.to_string(),
                "components" => self.components_layer(asset)?,
                "utilities" => self.utilities_layer(),
                other => {
                    return Err(TailpackError::transform(
                        asset,
                        STAGE,
                        format!("unknown @tailwind layer '{}'", other),
                    ))
                }
            };
            expanded.push_str(&layer);
            cursor = whole.end;
        }
        expanded.push_str(&css[cursor..]);

        let mut out = String::with_capacity(expanded.len());
        let mut cursor = 0;
        for caps in APPLY_RE.captures_iter(&expanded) {
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            out.push_str(&expanded[cursor..whole.start]);
            let declarations = self.expand_apply(asset, &caps[1])?;
            out.push_str(
                &declarations
                    .iter()
                    .map(|(p, v)| format!("{}: {};", p, v))
                    .collect::<Vec<_>>()
                    .join(" "),
            );
            cursor = whole.end;
        }
        out.push_str(&expanded[cursor..]);

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    fn transform(root: &Path, content: Vec<String>) -> UtilityClassTransform {
        UtilityClassTransform::new(
            root,
            UtilitiesConfig {
                content,
                custom: BTreeMap::from([("brand".to_string(), "color: #0f766e; font-weight: 600".to_string())]),
                components: BTreeMap::from([(".btn".to_string(), "px-4 py-2 rounded".to_string())]),
            },
        )
    }

    #[test]
    fn test_builtin_lookup() {
        let t = transform(Path::new("/"), vec![]);
        assert_eq!(t.lookup("p-4"), Some(vec![("padding".into(), "1rem".into())]));
        assert_eq!(
            t.lookup("px-2.5"),
            Some(vec![
                ("padding-left".into(), "0.625rem".into()),
                ("padding-right".into(), "0.625rem".into())
            ])
        );
        assert_eq!(t.lookup("-mt-2"), Some(vec![("margin-top".into(), "-0.5rem".into())]));
        assert_eq!(t.lookup("gap-x-2"), Some(vec![("column-gap".into(), "0.5rem".into())]));
        assert_eq!(t.lookup("bg-blue-500"), Some(vec![("background-color".into(), "#3b82f6".into())]));
        assert_eq!(t.lookup("w-1/2"), Some(vec![("width".into(), "50%".into())]));
        assert_eq!(t.lookup("text-sm").map(|d| d.len()), Some(2));
        assert_eq!(t.lookup("brand").map(|d| d.len()), Some(2));
        assert_eq!(t.lookup("p-1000"), None);
        assert_eq!(t.lookup("-p-4"), None);
        assert_eq!(t.lookup("bg-mauve-500"), None);
    }

    #[test]
    fn test_apply_expands_declarations() {
        let t = transform(Path::new("/"), vec![]);
        let out = t
            .apply(Path::new("main.css"), ".card { @apply p-4 bg-white; color: red; }")
            .unwrap();
        assert_eq!(out, ".card { padding: 1rem; background-color: #fff; color: red; }");
    }

    #[test]
    fn test_apply_unknown_class_is_transform_error() {
        let t = transform(Path::new("/"), vec![]);
        let err = t
            .apply(Path::new("main.css"), ".card { @apply p-4 not-a-class; }")
            .unwrap_err();
        match err {
            TailpackError::Transform { asset, stage, message } => {
                assert_eq!(asset, PathBuf::from("main.css"));
                assert_eq!(stage, "utilities");
                assert!(message.contains("not-a-class"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_utilities_layer_from_content() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::write(
            dir.path().join("templates/index.html"),
            r#"<div class="flex md:hidden hover:bg-blue-500 p-4 select-none unknown-thing">"#,
        )
        .unwrap();

        let t = transform(dir.path(), vec!["templates/**/*.html".to_string()]);
        let out = t.apply(Path::new("main.css"), "@tailwind utilities;").unwrap();

        let flex = out.find(".flex {").unwrap();
        let hover = out.find(".hover\\:bg-blue-500:hover {").unwrap();
        let media = out.find("@media (min-width: 768px) {").unwrap();
        assert!(flex < hover && hover < media);
        assert!(out.contains(".md\\:hidden {"));
        assert!(out.contains("user-select: none;"));
        assert!(!out.contains("unknown-thing"));
    }

    #[test]
    fn test_utilities_layer_is_deterministic() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.html"), r#"<p class="text-center mt-2 flex">"#).unwrap();
        fs::write(dir.path().join("b.html"), r#"<p class="flex items-center">"#).unwrap();

        let t = transform(dir.path(), vec!["*.html".to_string()]);
        let first = t.apply(Path::new("main.css"), "@tailwind utilities;").unwrap();
        let second = t.apply(Path::new("main.css"), "@tailwind utilities;").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.matches(".flex {").count(), 1);
    }

    #[test]
    fn test_base_and_components_layers() {
        let t = transform(Path::new("/"), vec![]);
        let out = t
            .apply(Path::new("main.css"), "@tailwind base;\n@tailwind components;\n")
            .unwrap();
        assert!(out.contains("box-sizing: border-box;"));
        assert!(out.contains(".btn {\n  padding-left: 1rem;"));
        assert!(out.contains("border-radius: 0.25rem;"));
    }

    #[test]
    fn test_escape_class() {
        assert_eq!(escape_class("md:hover:p-4"), "md\\:hover\\:p-4");
        assert_eq!(escape_class("w-1/2"), "w-1\\/2");
        assert_eq!(escape_class("px-2.5"), "px-2\\.5");
        assert_eq!(escape_class("2xl"), "\\32 xl");
    }
}
