//! Column resolution by header-name heuristics.
//!
//! Source spreadsheets vary in capitalization, accents and wording, so each
//! logical [`Field`] is resolved with an ordered list of [`Pattern`]s matched
//! against normalized headers. An unresolved field means "feature not
//! available" and is never an error on its own.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Logical fields the engine knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Field {
    // unit table
    UnitPrice,
    UnitArea,
    Bedrooms,
    Bathrooms,
    Parking,
    // project table
    AvailableUnits,
    SalesPerMonth,
    TotalUnits,
    PricePerM2,
    AvgPrice,
    AvgArea,
    Zone,
    SubZone,
    Neighborhood,
    Stratum,
    Status,
    Code,
    Name,
    LaunchDate,
    Coordinates,
    Address,
    Amenities,
    Builder,
    Seller,
    VisType,
}

impl Field {
    pub const UNIT_FIELDS: [Field; 5] = [
        Field::UnitPrice,
        Field::UnitArea,
        Field::Bedrooms,
        Field::Bathrooms,
        Field::Parking,
    ];

    pub const PROJECT_FIELDS: [Field; 20] = [
        Field::AvailableUnits,
        Field::SalesPerMonth,
        Field::TotalUnits,
        Field::PricePerM2,
        Field::AvgPrice,
        Field::AvgArea,
        Field::Zone,
        Field::SubZone,
        Field::Neighborhood,
        Field::Stratum,
        Field::Status,
        Field::Code,
        Field::Name,
        Field::LaunchDate,
        Field::Coordinates,
        Field::Address,
        Field::Amenities,
        Field::Builder,
        Field::Seller,
        Field::VisType,
    ];

    /// Ordered patterns; the first pattern with any matching header wins.
    fn patterns(&self) -> &'static [Pattern] {
        use Pattern::*;
        match self {
            Field::UnitPrice => &[Keywords { all: &["precio"], any: &[], none: &["prom", "m2"] }],
            Field::UnitArea => &[Keywords { all: &["area"], any: &[], none: &["prom"] }],
            Field::Bedrooms => &[Keywords { all: &["alcoba"], any: &[], none: &[] }],
            Field::Bathrooms => &[Keywords { all: &[], any: &["baño", "bano"], none: &[] }],
            Field::Parking => &[Keywords { all: &["garaje"], any: &[], none: &[] }],
            Field::AvailableUnits => &[Keywords { all: &["dispon", "un"], any: &[], none: &[] }],
            Field::SalesPerMonth => &[
                Keywords { all: &["venta", "mes"], any: &[" un", "unid"], none: &["$"] },
                Keywords { all: &["capacidad", "venta"], any: &[], none: &["$"] },
            ],
            Field::TotalUnits => &[Keywords { all: &["proyecto", "un"], any: &["tot"], none: &[] }],
            Field::PricePerM2 => &[Keywords { all: &["m2", "prom"], any: &[], none: &[] }],
            Field::AvgPrice => &[Keywords { all: &["precio prom"], any: &[], none: &["m2"] }],
            Field::AvgArea => &[Keywords { all: &["area prom"], any: &[], none: &[] }],
            Field::Zone => &[Exact("zona")],
            Field::SubZone => &[Keywords { all: &[], any: &["sub zona", "subzona"], none: &[] }],
            Field::Neighborhood => &[Keywords { all: &["barrio"], any: &[], none: &[] }],
            Field::Stratum => &[Exact("estrato")],
            Field::Status => &[Keywords { all: &["estado etapas"], any: &[], none: &[] }],
            Field::Code => &[
                Keywords { all: &["codigo proyecto"], any: &[], none: &[] },
                Keywords { all: &["cod", "proyecto"], any: &[], none: &[] },
            ],
            Field::Name => &[Exact("proyecto"), Exact("nombre proyecto")],
            Field::LaunchDate => &[Keywords { all: &["fecha inicio"], any: &[], none: &[] }],
            Field::Coordinates => &[Keywords { all: &["coordenadas"], any: &[], none: &[] }],
            Field::Address => &[Keywords { all: &["direccion"], any: &[], none: &[] }],
            Field::Amenities => &[Exact("otros"), Keywords { all: &["amenidad"], any: &[], none: &[] }],
            Field::Builder => &[Keywords { all: &["constructor"], any: &[], none: &[] }],
            Field::Seller => &[Keywords { all: &["vende"], any: &[], none: &[] }],
            Field::VisType => &[Keywords { all: &[], any: &["tipo vis", "tipo_vis"], none: &[] }],
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A header matcher over normalized names.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    Exact(&'static str),
    Keywords {
        all: &'static [&'static str],
        any: &'static [&'static str],
        none: &'static [&'static str],
    },
}

impl Pattern {
    pub fn matches(&self, normalized: &str) -> bool {
        match self {
            Pattern::Exact(name) => normalized == *name,
            Pattern::Keywords { all, any, none } => {
                all.iter().all(|t| normalized.contains(t))
                    && (any.is_empty() || any.iter().any(|t| normalized.contains(t)))
                    && !none.iter().any(|t| normalized.contains(t))
            }
        }
    }
}

/// Lower-case, fold accents (keeping ñ), drop dots, collapse whitespace.
pub fn normalize_header(header: &str) -> String {
    let folded: String = header
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '.')
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn resolve(headers: &[&str], field: Field) -> Option<String> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    field.patterns().iter().find_map(|pattern| {
        normalized
            .iter()
            .position(|h| pattern.matches(h))
            .map(|i| headers[i].to_string())
    })
}

/// Resolved field → column-name mapping for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaMap {
    resolved: BTreeMap<Field, String>,
}

impl SchemaMap {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.resolved.get(&field).map(String::as_str)
    }

    pub fn has(&self, field: Field) -> bool {
        self.resolved.contains_key(&field)
    }

    pub fn insert(&mut self, field: Field, column: impl Into<String>) {
        self.resolved.insert(field, column.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.resolved.iter().map(|(f, c)| (*f, c.as_str()))
    }
}

pub fn detect(headers: &[&str], fields: &[Field]) -> SchemaMap {
    let mut map = SchemaMap::default();
    for &field in fields {
        if let Some(column) = resolve(headers, field) {
            map.insert(field, column);
        }
    }
    map
}

// ── Join keys ───────────────────────────────────────────────────────────────

const UNIT_KEY_CANDIDATES: [&str; 5] = [
    "codigo de proyecto",
    "codigo proyecto",
    "codigo_proyecto",
    "cod proyecto",
    "cod de proyecto",
];

const PROJECT_KEY_CANDIDATES: [&str; 5] = [
    "cod proyecto",
    "codigo proyecto",
    "codigo_proyecto",
    "codigo de proyecto",
    "cod de proyecto",
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinKeys {
    pub unit: Option<String>,
    pub project: Option<String>,
}

impl JoinKeys {
    pub fn resolved(&self) -> Option<(&str, &str)> {
        match (&self.unit, &self.project) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

fn find_candidate(headers: &[&str], candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|cand| {
        headers
            .iter()
            .find(|h| normalize_header(h) == *cand)
            .map(|h| h.to_string())
    })
}

/// Resolve the project key in both tables. Falls back to the first shared
/// column mentioning both "cod" and "proyecto", then to any shared column.
pub fn join_keys(unit_headers: &[&str], project_headers: &[&str]) -> JoinKeys {
    let mut keys = JoinKeys {
        unit: find_candidate(unit_headers, &UNIT_KEY_CANDIDATES),
        project: find_candidate(project_headers, &PROJECT_KEY_CANDIDATES),
    };
    if keys.unit.is_some() && keys.project.is_some() {
        return keys;
    }

    let common: Vec<&str> = unit_headers
        .iter()
        .copied()
        .filter(|h| project_headers.contains(h))
        .collect();
    let shared = common
        .iter()
        .find(|h| {
            let n = normalize_header(h);
            n.contains("cod") && n.contains("proyecto")
        })
        .or_else(|| common.first())
        .map(|h| h.to_string());

    if let Some(shared) = shared {
        keys.unit.get_or_insert_with(|| shared.clone());
        keys.project.get_or_insert(shared);
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_folds_case_accents_and_dots() {
        assert_eq!(normalize_header("  Código  de  Proyecto "), "codigo de proyecto");
        assert_eq!(normalize_header("Unid. Disponibles"), "unid disponibles");
        assert_eq!(normalize_header("Baños"), "baños");
    }

    #[test]
    fn price_excludes_average_columns() {
        let headers = ["Precio Promedio", "Precio", "Area Promedio", "Area"];
        assert_eq!(resolve(&headers, Field::UnitPrice).as_deref(), Some("Precio"));
        assert_eq!(resolve(&headers, Field::UnitArea).as_deref(), Some("Area"));
        assert_eq!(resolve(&headers, Field::AvgPrice).as_deref(), Some("Precio Promedio"));
    }

    #[test]
    fn sales_per_month_skips_money_columns() {
        let headers = ["Ventas Mes $", "Ventas Mes Unidades"];
        assert_eq!(
            resolve(&headers, Field::SalesPerMonth).as_deref(),
            Some("Ventas Mes Unidades")
        );
        let fallback = ["Capacidad de venta"];
        assert_eq!(
            resolve(&fallback, Field::SalesPerMonth).as_deref(),
            Some("Capacidad de venta")
        );
    }

    #[test]
    fn exact_fields_do_not_match_substrings() {
        let headers = ["Sub Zona", "Zona", "Estrato Social", "Estrato"];
        assert_eq!(resolve(&headers, Field::Zone).as_deref(), Some("Zona"));
        assert_eq!(resolve(&headers, Field::SubZone).as_deref(), Some("Sub Zona"));
        assert_eq!(resolve(&headers, Field::Stratum).as_deref(), Some("Estrato"));
    }

    #[test]
    fn detect_returns_only_resolved_fields() {
        let headers = ["Unidades Disponibles", "Total Unidades Proyecto", "Alcobas"];
        let map = detect(&headers, &Field::PROJECT_FIELDS);
        assert_eq!(map.get(Field::AvailableUnits), Some("Unidades Disponibles"));
        assert_eq!(map.get(Field::TotalUnits), Some("Total Unidades Proyecto"));
        assert_eq!(map.get(Field::Zone), None);
    }

    #[test]
    fn join_keys_prefer_known_candidates() {
        let keys = join_keys(&["Código de proyecto", "Precio"], &["Cod proyecto", "Zona"]);
        assert_eq!(keys.unit.as_deref(), Some("Código de proyecto"));
        assert_eq!(keys.project.as_deref(), Some("Cod proyecto"));
    }

    #[test]
    fn join_keys_fall_back_to_shared_column() {
        let keys = join_keys(&["id", "Precio"], &["Zona", "id"]);
        assert_eq!(keys.resolved(), Some(("id", "id")));

        let keys = join_keys(&["Precio"], &["Zona"]);
        assert_eq!(keys.resolved(), None);
    }
}
