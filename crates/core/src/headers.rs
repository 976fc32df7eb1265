use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Semantic meaning of a table column, in catalogs and in invoices alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Code,
    Description,
    Quantity,
    UnitPrice,
    LineTotal,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Code => write!(f, "code"),
            ColumnRole::Description => write!(f, "description"),
            ColumnRole::Quantity => write!(f, "quantity"),
            ColumnRole::UnitPrice => write!(f, "unit_price"),
            ColumnRole::LineTotal => write!(f, "line_total"),
        }
    }
}

impl ColumnRole {
    /// Column name as shown in reports.
    pub fn label(&self) -> &'static str {
        match self {
            ColumnRole::Code => "codice",
            ColumnRole::Description => "descrizione",
            ColumnRole::Quantity => "quantità",
            ColumnRole::UnitPrice => "prezzo",
            ColumnRole::LineTotal => "importo",
        }
    }
}

/// Lowercase and drop all whitespace: `"Prezzo Unitario"` → `"prezzounitario"`.
pub fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

const BUILTIN: &[(ColumnRole, &[&str])] = &[
    (
        ColumnRole::Code,
        &[
            "codice", "cod.", "cod", "codart", "codart.", "cod.art.", "codicearticolo", "articolo",
            "art.", "art", "code", "productcode", "sku",
        ],
    ),
    (
        ColumnRole::Description,
        &["descrizione", "desc.", "desc", "descr.", "descr", "descrizionearticolo", "description", "prodotto"],
    ),
    (
        ColumnRole::Quantity,
        &["quantità", "quantita", "q.tà", "q.ta", "qtà", "qta", "qty", "quantity", "pz", "pezzi"],
    ),
    (
        ColumnRole::UnitPrice,
        &[
            "prezzo", "prz.", "prz", "prezzounitario", "prezzounit.", "prezzoun.", "p.u.", "pu",
            "tariffa", "unitprice", "price",
        ],
    ),
    (
        ColumnRole::LineTotal,
        &[
            "importo", "totale", "tot.", "tot", "totaleriga", "importototale", "prezzototale", "total",
            "amount", "imponibile",
        ],
    ),
];

/// Header text → column role table. Matching is exact on the normalized form.
#[derive(Debug, Clone)]
pub struct HeaderAliases {
    table: Vec<(String, ColumnRole)>,
}

impl Default for HeaderAliases {
    fn default() -> Self {
        let table = BUILTIN
            .iter()
            .flat_map(|(role, names)| names.iter().map(move |n| (normalize_header(n), *role)))
            .collect();
        Self { table }
    }
}

impl HeaderAliases {
    /// Add aliases for a role. Later additions never shadow built-ins.
    pub fn with_extra<I, S>(mut self, role: ColumnRole, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for alias in aliases {
            let key = normalize_header(alias.as_ref());
            if !key.is_empty() && !self.table.iter().any(|(k, _)| *k == key) {
                self.table.push((key, role));
            }
        }
        self
    }

    pub fn role_of(&self, header: &str) -> Option<ColumnRole> {
        let key = normalize_header(header);
        self.table.iter().find(|(k, _)| *k == key).map(|(_, r)| *r)
    }

    /// Map a row of header cells to column positions. First occurrence of a
    /// role wins.
    pub fn locate<S: AsRef<str>>(&self, cells: &[S]) -> ColumnMap {
        let mut positions = BTreeMap::new();
        for (idx, cell) in cells.iter().enumerate() {
            if let Some(role) = self.role_of(cell.as_ref()) {
                positions.entry(role).or_insert(idx);
            }
        }
        ColumnMap { positions }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    positions: BTreeMap<ColumnRole, usize>,
}

impl ColumnMap {
    pub fn get(&self, role: ColumnRole) -> Option<usize> {
        self.positions.get(&role).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn missing(&self, required: &[ColumnRole]) -> Vec<ColumnRole> {
        required.iter().filter(|r| !self.positions.contains_key(r)).copied().collect()
    }

    pub fn has_all(&self, required: &[ColumnRole]) -> bool {
        self.missing(required).is_empty()
    }

    pub fn roles(&self) -> impl Iterator<Item = (ColumnRole, usize)> + '_ {
        self.positions.iter().map(|(r, i)| (*r, *i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_spaces_and_case() {
        assert_eq!(normalize_header("  Prezzo Unitario "), "prezzounitario");
        assert_eq!(normalize_header("Q.TÀ"), "q.tà");
    }

    #[test]
    fn builtin_aliases_resolve() {
        let aliases = HeaderAliases::default();
        assert_eq!(aliases.role_of("Cod. Art."), Some(ColumnRole::Code));
        assert_eq!(aliases.role_of("DESCRIZIONE"), Some(ColumnRole::Description));
        assert_eq!(aliases.role_of("Q.tà"), Some(ColumnRole::Quantity));
        assert_eq!(aliases.role_of("Prezzo"), Some(ColumnRole::UnitPrice));
        assert_eq!(aliases.role_of("Importo"), Some(ColumnRole::LineTotal));
        assert_eq!(aliases.role_of("Sconto"), None);
    }

    #[test]
    fn extra_aliases_do_not_shadow_builtins() {
        let aliases = HeaderAliases::default()
            .with_extra(ColumnRole::UnitPrice, ["Listino"])
            .with_extra(ColumnRole::Quantity, ["Prezzo"]);
        assert_eq!(aliases.role_of("listino"), Some(ColumnRole::UnitPrice));
        assert_eq!(aliases.role_of("prezzo"), Some(ColumnRole::UnitPrice));
    }

    #[test]
    fn locate_keeps_first_occurrence() {
        let aliases = HeaderAliases::default();
        let map = aliases.locate(&["Codice", "Descrizione", "Note", "Prezzo", "Prezzo unitario"]);
        assert_eq!(map.get(ColumnRole::Code), Some(0));
        assert_eq!(map.get(ColumnRole::UnitPrice), Some(3));
        assert_eq!(map.missing(&[ColumnRole::Code, ColumnRole::Quantity]), vec![ColumnRole::Quantity]);
    }
}
