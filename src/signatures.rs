//! Signature catalog: weighted checks per CMS, compiled once into an immutable registry.
//!
//! The built-in catalog is plain data ([`BUILTIN_PROFILES`]). It goes through the
//! same compile step as an externally supplied JSON catalog, so both paths share
//! validation (regex syntax, header names, positive weights).

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::SignatureError;

/// Minimum matched weight before a candidate is reported as detected.
pub const DETECTION_THRESHOLD: u32 = 25;

/// Which facet of a fetched document a check inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// A named response header's value.
    Header,
    /// Cookie names and raw `Set-Cookie` values.
    Cookie,
    /// The raw (truncated) HTML body.
    Html,
    /// Content of the first generator meta tag.
    MetaGenerator,
    /// `src` and inline text of script tags.
    ///
    /// Scoped to `<script>` elements only; markup elsewhere in the body never
    /// matches. Catalogs that expect a body-wide search should use [`CheckKind::Html`].
    Script,
    /// Attributes of any meta tag, rendered as `key="value"` pairs.
    ///
    /// Scoped to `<meta>` elements only, like [`CheckKind::Script`].
    Meta,
}

/// One weighted rule.
#[derive(Debug, Clone)]
pub struct SignatureCheck {
    pub kind: CheckKind,
    pub pattern: Regex,
    /// Lowercase header name; always present for [`CheckKind::Header`].
    pub header_name: Option<String>,
    pub weight: u32,
    pub description: String,
}

/// All checks for one CMS, in reporting order.
#[derive(Debug, Clone)]
pub struct CmsProfile {
    pub name: String,
    pub checks: Vec<SignatureCheck>,
    /// Captures the version from generator content in group 1.
    pub version_pattern: Option<Regex>,
}

impl CmsProfile {
    /// Highest score this profile can reach: the sum of every check's weight.
    pub fn max_score(&self) -> u32 {
        self.checks.iter().map(|check| check.weight).sum()
    }
}

/// Immutable, compiled catalog shared read-only across requests.
#[derive(Debug, Clone)]
pub struct SignatureRegistry {
    profiles: Vec<CmsProfile>,
    threshold: u32,
}

impl SignatureRegistry {
    /// Compiles the built-in catalog.
    pub fn builtin() -> Result<Self, SignatureError> {
        Self::compile(CatalogDef::builtin())
    }

    /// Compiles a catalog from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, SignatureError> {
        let catalog: CatalogDef = serde_json::from_str(json)?;
        Self::compile(catalog)
    }

    /// Reads and compiles a JSON catalog file.
    pub fn from_path(path: &Path) -> Result<Self, SignatureError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Validates and compiles a declarative catalog.
    pub fn compile(catalog: CatalogDef) -> Result<Self, SignatureError> {
        if catalog.profiles.is_empty() {
            return Err(SignatureError::EmptyCatalog);
        }

        let mut profiles = Vec::with_capacity(catalog.profiles.len());
        for profile in catalog.profiles {
            let mut checks = Vec::with_capacity(profile.checks.len());
            for check in profile.checks {
                if check.weight == 0 {
                    return Err(SignatureError::ZeroWeight {
                        profile: profile.name.clone(),
                        description: check.description,
                    });
                }

                let header_name = check
                    .header_name
                    .map(|name| name.trim().to_ascii_lowercase())
                    .filter(|name| !name.is_empty());
                if check.kind == CheckKind::Header && header_name.is_none() {
                    return Err(SignatureError::MissingHeaderName {
                        profile: profile.name.clone(),
                        description: check.description,
                    });
                }

                checks.push(SignatureCheck {
                    kind: check.kind,
                    pattern: compile_pattern(&profile.name, &check.pattern)?,
                    header_name,
                    weight: check.weight,
                    description: check.description,
                });
            }

            let version_pattern = profile
                .version_pattern
                .as_deref()
                .map(|pattern| compile_pattern(&profile.name, pattern))
                .transpose()?;

            profiles.push(CmsProfile {
                name: profile.name,
                checks,
                version_pattern,
            });
        }

        debug!("Compiled signature catalog with {} profiles", profiles.len());

        Ok(Self {
            profiles,
            threshold: catalog.threshold.unwrap_or(DETECTION_THRESHOLD),
        })
    }

    /// Profiles in catalog order, which is also the tie-break order.
    pub fn profiles(&self) -> &[CmsProfile] {
        &self.profiles
    }

    pub fn profile(&self, name: &str) -> Option<&CmsProfile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn compile_pattern(profile: &str, pattern: &str) -> Result<Regex, SignatureError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| SignatureError::InvalidPattern {
            profile: profile.to_string(),
            pattern: pattern.to_string(),
            source,
        })
}

/// Serializable catalog, the shape accepted by [`SignatureRegistry::from_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
    pub profiles: Vec<ProfileDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_pattern: Option<String>,
    pub checks: Vec<CheckDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDef {
    pub kind: CheckKind,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
    pub weight: u32,
    pub description: String,
}

impl CatalogDef {
    /// The built-in catalog in declarative form.
    pub fn builtin() -> Self {
        Self {
            threshold: Some(DETECTION_THRESHOLD),
            profiles: BUILTIN_PROFILES
                .iter()
                .map(|profile| ProfileDef {
                    name: profile.name.to_string(),
                    version_pattern: profile.version_pattern.map(String::from),
                    checks: profile
                        .checks
                        .iter()
                        .map(|check| CheckDef {
                            kind: check.kind,
                            pattern: check.pattern.to_string(),
                            header_name: check.header_name.map(String::from),
                            weight: check.weight,
                            description: check.description.to_string(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Static form of a profile in the built-in table.
pub struct BuiltinProfile {
    pub name: &'static str,
    pub version_pattern: Option<&'static str>,
    pub checks: &'static [BuiltinCheck],
}

/// Static form of a check in the built-in table.
pub struct BuiltinCheck {
    pub kind: CheckKind,
    pub pattern: &'static str,
    pub header_name: Option<&'static str>,
    pub weight: u32,
    pub description: &'static str,
}

const fn check(kind: CheckKind, pattern: &'static str, weight: u32, description: &'static str) -> BuiltinCheck {
    BuiltinCheck {
        kind,
        pattern,
        header_name: None,
        weight,
        description,
    }
}

const fn header(name: &'static str, pattern: &'static str, weight: u32, description: &'static str) -> BuiltinCheck {
    BuiltinCheck {
        kind: CheckKind::Header,
        pattern,
        header_name: Some(name),
        weight,
        description,
    }
}

use CheckKind::{Cookie, Html, MetaGenerator};

// A "." pattern on a header check is a presence check for that header.
pub static BUILTIN_PROFILES: &[BuiltinProfile] = &[
    BuiltinProfile {
        name: "WordPress",
        version_pattern: Some(r"WordPress\s+([\d.]+)"),
        checks: &[
            check(MetaGenerator, r"WordPress", 35, "meta_generator: WordPress"),
            check(Html, r"/wp-content/", 30, "html: /wp-content/ found"),
            check(Html, r"/wp-includes/", 25, "html: /wp-includes/ found"),
            header("x-pingback", r".", 25, "header: X-Pingback present"),
            header("link", r"wp-json", 20, "header: wp-json API link"),
            check(Html, r"_wpemojiSettings", 20, "html: _wpemojiSettings JS"),
            check(Html, r"wp-embed\.min\.js", 15, "html: wp-embed.min.js"),
        ],
    },
    BuiltinProfile {
        name: "Shopify",
        version_pattern: None,
        checks: &[
            header("x-shopify-stage", r".", 35, "header: x-shopify-stage present"),
            check(Html, r"cdn\.shopify\.com", 30, "html: cdn.shopify.com scripts"),
            check(Html, r"shopify-checkout-api-token", 25, "html: shopify-checkout-api-token meta"),
            check(Html, r"Shopify\.theme", 25, "html: Shopify.theme JS"),
            header("x-sorting-hat-shopid", r"shopify", 20, "header: x-sorting-hat-shopid present"),
            check(Html, r"myshopify\.com", 15, "html: myshopify.com reference"),
        ],
    },
    BuiltinProfile {
        name: "Wix",
        version_pattern: None,
        checks: &[
            header("x-wix-request-id", r".", 35, "header: X-Wix-Request-Id present"),
            check(Html, r"static\.parastorage\.com", 30, "html: parastorage.com scripts"),
            check(MetaGenerator, r"Wix\.com", 35, "meta_generator: Wix.com"),
            check(Html, r"wix-code-sdk", 20, "html: wix-code-sdk reference"),
            check(Html, r"wixstatic\.com", 20, "html: wixstatic.com reference"),
        ],
    },
    BuiltinProfile {
        name: "Squarespace",
        version_pattern: None,
        checks: &[
            header("server", r"Squarespace", 35, "header: Server: Squarespace"),
            check(Html, r"SQUARESPACE_CONTEXT", 30, "html: SQUARESPACE_CONTEXT JS"),
            check(Html, r"sqs-block", 25, "html: sqs-block CSS classes"),
            check(Html, r"squarespace\.com", 20, "html: squarespace.com reference"),
            check(Html, r"sqsp\.net", 15, "html: sqsp.net CDN reference"),
        ],
    },
    BuiltinProfile {
        name: "Drupal",
        version_pattern: Some(r"Drupal\s+([\d.]+)"),
        checks: &[
            header("x-drupal-cache", r".", 35, "header: X-Drupal-Cache present"),
            header("x-generator", r"Drupal", 35, "header: X-Generator: Drupal"),
            header("expires", r"19 Nov 1978", 25, "header: Expires: 19 Nov 1978 (Drupal signature)"),
            check(Html, r"/sites/default/files/", 25, "html: /sites/default/files/ path"),
            check(MetaGenerator, r"Drupal", 35, "meta_generator: Drupal"),
            check(Html, r"drupal\.js|drupal\.min\.js|Drupal\.settings", 20, "html: Drupal JS references"),
        ],
    },
    BuiltinProfile {
        name: "Joomla",
        version_pattern: Some(r"Joomla!\s+([\d.]+)"),
        checks: &[
            check(MetaGenerator, r"Joomla", 35, "meta_generator: Joomla"),
            header("x-content-encoded-by", r"Joomla", 30, "header: X-Content-Encoded-By: Joomla"),
            check(Html, r"/components/com_", 25, "html: /components/com_ paths"),
            check(Html, r"/media/system/js/", 20, "html: /media/system/js/ Joomla path"),
            check(Html, r"Joomla!", 15, "html: Joomla! reference"),
        ],
    },
    BuiltinProfile {
        name: "Webflow",
        version_pattern: None,
        checks: &[
            check(MetaGenerator, r"Webflow", 35, "meta_generator: Webflow"),
            check(Html, r"data-wf-site", 30, "html: data-wf-site attribute"),
            check(Html, r"data-wf-page", 25, "html: data-wf-page attribute"),
            check(Html, r"webflow\.io|assets\.website-files\.com", 20, "html: webflow.io / website-files.com URLs"),
            check(Html, r"w-nav|w-slider|w-tabs", 15, "html: Webflow w- CSS classes"),
        ],
    },
    BuiltinProfile {
        name: "Ghost",
        version_pattern: Some(r"Ghost\s+([\d.]+)"),
        checks: &[
            check(MetaGenerator, r"Ghost", 35, "meta_generator: Ghost"),
            header("x-ghost-cache-status", r".", 30, "header: X-Ghost-Cache-Status present"),
            check(Html, r"/ghost/api/", 25, "html: /ghost/api/ references"),
            check(Html, r"ghost-portal", 20, "html: ghost-portal script"),
            check(Html, r"content/themes/", 15, "html: Ghost content/themes/ path"),
        ],
    },
    BuiltinProfile {
        name: "HubSpot CMS",
        version_pattern: None,
        checks: &[
            header("x-powered-by", r"HubSpot", 35, "header: X-Powered-By: HubSpot"),
            header("x-hs-hub-id", r".", 30, "header: x-hs-hub-id present"),
            check(Html, r"hs-scripts\.com", 25, "html: hs-scripts.com scripts"),
            check(Html, r"hubspot\.com", 20, "html: hubspot.com reference"),
            check(Html, r"hs-banner-cookie-consent", 15, "html: HubSpot cookie consent banner"),
        ],
    },
    BuiltinProfile {
        name: "BigCommerce",
        version_pattern: None,
        checks: &[
            check(Html, r#"platform=["']bigcommerce["']"#, 35, "html: platform=bigcommerce meta"),
            check(Html, r"bigcommerce\.com/s-", 30, "html: bigcommerce.com scripts"),
            check(Html, r"mybigcommerce\.com", 25, "html: mybigcommerce.com URLs"),
            header("x-bc-store-version", r"BigCommerce", 30, "header: X-BC-Store-Version present"),
            check(Html, r"stencil-utils", 15, "html: BigCommerce stencil-utils"),
        ],
    },
    BuiltinProfile {
        name: "Magento",
        version_pattern: None,
        checks: &[
            check(Cookie, r"X-Magento-Vary", 35, "cookie: X-Magento-Vary present"),
            check(Html, r"text/x-magento-init", 30, "html: text/x-magento-init script type"),
            check(Cookie, r"mage-cache-storage", 25, "cookie: mage-cache-storage present"),
            check(Html, r"Magento_Ui|Magento_Customer", 25, "html: Magento module references"),
            check(Html, r"/static/version", 15, "html: Magento /static/version path"),
        ],
    },
    BuiltinProfile {
        name: "PrestaShop",
        version_pattern: Some(r"PrestaShop\s+([\d.]+)"),
        checks: &[
            check(MetaGenerator, r"PrestaShop", 35, "meta_generator: PrestaShop"),
            check(Cookie, r"PrestaShop", 30, "cookie: PrestaShop cookie present"),
            header("powered-by", r"PrestaShop|Prestashop", 30, "header: Powered-By: PrestaShop"),
            check(Html, r"/modules/ps_|prestashop", 20, "html: PrestaShop module paths"),
            check(Html, r"prestashop\.js|presta\.js", 15, "html: PrestaShop JS files"),
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_compiles() {
        let registry = SignatureRegistry::builtin().unwrap();
        assert_eq!(registry.len(), BUILTIN_PROFILES.len());
        assert_eq!(registry.threshold(), DETECTION_THRESHOLD);
    }

    #[test]
    fn test_header_names_are_lowercased() {
        let json = r#"{"profiles": [{"name": "X", "checks": [
            {"kind": "header", "pattern": ".", "header_name": "X-Custom", "weight": 10, "description": "d"}
        ]}]}"#;
        let registry = SignatureRegistry::from_json(json).unwrap();
        assert_eq!(registry.profiles()[0].checks[0].header_name.as_deref(), Some("x-custom"));
    }
}
