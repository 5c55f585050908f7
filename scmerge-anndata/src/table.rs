//! Indexed annotation tables for `obs` and `var`.
//!
//! A [`Table`] is an ordered list of named [`ColumnData`] columns sharing one
//! string index. Column order is insertion order, which is also the
//! `column-order` written to disk.

use std::collections::HashSet;

use scmerge_core::{Result, ScmergeError};

/// A metadata column with typed data.
///
/// Supports string, numeric, categorical, and boolean columns as found in
/// `.h5ad` and `.zarr` stores. Missing values use per-kind sentinels: the
/// empty string, `NaN`, categorical code `-1`, and `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Free-text string values.
    Strings(Vec<String>),
    /// Numeric (f64) values.
    Numeric(Vec<f64>),
    /// Categorical data stored as integer codes indexing into a category list.
    Categorical {
        codes: Vec<i32>,
        categories: Vec<String>,
    },
    /// Boolean values; `None` marks a row with no value yet.
    Boolean(Vec<Option<bool>>),
}

impl ColumnData {
    /// Number of elements in this column.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Strings(v) => v.len(),
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical { codes, .. } => codes.len(),
            ColumnData::Boolean(v) => v.len(),
        }
    }

    /// Whether the column is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Try to get as string slice. Returns `None` if not `Strings` variant.
    pub fn as_strings(&self) -> Option<&Vec<String>> {
        match self {
            ColumnData::Strings(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as numeric slice. Returns `None` if not `Numeric` variant.
    pub fn as_numeric(&self) -> Option<&Vec<f64>> {
        match self {
            ColumnData::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as boolean slice. Returns `None` if not `Boolean` variant.
    pub fn as_boolean(&self) -> Option<&Vec<Option<bool>>> {
        match self {
            ColumnData::Boolean(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this is a boolean column.
    pub fn is_boolean(&self) -> bool {
        matches!(self, ColumnData::Boolean(_))
    }

    /// A boolean column of `n` copies of `value`.
    pub fn constant_bool(n: usize, value: bool) -> Self {
        ColumnData::Boolean(vec![Some(value); n])
    }

    /// The label of each row as a string, `None` where the value is missing.
    pub fn labels(&self) -> Vec<Option<String>> {
        match self {
            ColumnData::Strings(v) => v
                .iter()
                .map(|s| (!s.is_empty()).then(|| s.clone()))
                .collect(),
            ColumnData::Numeric(v) => v
                .iter()
                .map(|x| (!x.is_nan()).then(|| x.to_string()))
                .collect(),
            ColumnData::Categorical { codes, categories } => codes
                .iter()
                .map(|&c| usize::try_from(c).ok().and_then(|i| categories.get(i).cloned()))
                .collect(),
            ColumnData::Boolean(v) => v.iter().map(|b| b.map(|b| b.to_string())).collect(),
        }
    }

    /// A column of the same kind holding `n` missing values.
    pub fn missing_like(&self, n: usize) -> Self {
        match self {
            ColumnData::Strings(_) => ColumnData::Strings(vec![String::new(); n]),
            ColumnData::Numeric(_) => ColumnData::Numeric(vec![f64::NAN; n]),
            ColumnData::Categorical { categories, .. } => ColumnData::Categorical {
                codes: vec![-1; n],
                categories: categories.clone(),
            },
            ColumnData::Boolean(_) => ColumnData::Boolean(vec![None; n]),
        }
    }

    /// Append `other` below `self`.
    ///
    /// Categorical columns merge their category lists (categories of `self`
    /// first) and remap the codes of `other`. Columns of different kinds fall
    /// back to string labels.
    pub fn concat(&self, other: &ColumnData) -> ColumnData {
        match (self, other) {
            (ColumnData::Strings(a), ColumnData::Strings(b)) => {
                ColumnData::Strings(a.iter().chain(b).cloned().collect())
            }
            (ColumnData::Numeric(a), ColumnData::Numeric(b)) => {
                ColumnData::Numeric(a.iter().chain(b).copied().collect())
            }
            (ColumnData::Boolean(a), ColumnData::Boolean(b)) => {
                ColumnData::Boolean(a.iter().chain(b).copied().collect())
            }
            (
                ColumnData::Categorical {
                    codes: a_codes,
                    categories: a_cats,
                },
                ColumnData::Categorical {
                    codes: b_codes,
                    categories: b_cats,
                },
            ) => {
                let mut categories = a_cats.clone();
                let remap: Vec<i32> = b_cats
                    .iter()
                    .map(|c| match categories.iter().position(|x| x == c) {
                        Some(i) => i as i32,
                        None => {
                            categories.push(c.clone());
                            (categories.len() - 1) as i32
                        }
                    })
                    .collect();
                let codes = a_codes
                    .iter()
                    .copied()
                    .chain(b_codes.iter().map(|&c| {
                        usize::try_from(c)
                            .ok()
                            .and_then(|i| remap.get(i).copied())
                            .unwrap_or(-1)
                    }))
                    .collect();
                ColumnData::Categorical { codes, categories }
            }
            (a, b) => ColumnData::Strings(
                a.labels()
                    .into_iter()
                    .chain(b.labels())
                    .map(Option::unwrap_or_default)
                    .collect(),
            ),
        }
    }

    /// Replace missing boolean values with `value`. Other kinds are unchanged.
    pub fn fill_missing_bool(&mut self, value: bool) {
        if let ColumnData::Boolean(v) = self {
            for b in v.iter_mut().filter(|b| b.is_none()) {
                *b = Some(value);
            }
        }
    }

    /// Subset to the given indices.
    pub fn subset(&self, indices: &[usize]) -> Self {
        match self {
            ColumnData::Strings(v) => {
                ColumnData::Strings(indices.iter().map(|&i| v[i].clone()).collect())
            }
            ColumnData::Numeric(v) => {
                ColumnData::Numeric(indices.iter().map(|&i| v[i]).collect())
            }
            ColumnData::Categorical { codes, categories } => ColumnData::Categorical {
                codes: indices.iter().map(|&i| codes[i]).collect(),
                categories: categories.clone(),
            },
            ColumnData::Boolean(v) => {
                ColumnData::Boolean(indices.iter().map(|&i| v[i]).collect())
            }
        }
    }
}

/// A table of columns indexed by string identifiers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    index: Vec<String>,
    columns: Vec<(String, ColumnData)>,
}

impl Table {
    /// Create a table with the given index and no columns.
    pub fn new(index: Vec<String>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    /// Create a table from an index and columns, checking every column length.
    pub fn from_parts(index: Vec<String>, columns: Vec<(String, ColumnData)>) -> Result<Self> {
        let mut table = Self::new(index);
        for (name, col) in columns {
            table.insert(&name, col)?;
        }
        Ok(table)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Row identifiers.
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Columns in order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnData)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Get a column by name.
    pub fn get(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Get a column by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ColumnData> {
        self.columns
            .iter_mut()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Insert a column, replacing an existing column of the same name in place.
    pub fn insert(&mut self, name: &str, data: ColumnData) -> Result<()> {
        if data.len() != self.len() {
            return Err(ScmergeError::InvalidInput(format!(
                "column '{}' length ({}) does not match table length ({})",
                name,
                data.len(),
                self.len()
            )));
        }
        match self.get_mut(name) {
            Some(slot) => *slot = data,
            None => self.columns.push((name.to_string(), data)),
        }
        Ok(())
    }

    /// Whether every index entry is distinct.
    pub fn has_unique_index(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.index.len());
        self.index.iter().all(|id| seen.insert(id.as_str()))
    }

    /// The same columns under a new index of equal length.
    pub fn with_index(&self, index: Vec<String>) -> Result<Table> {
        if index.len() != self.len() {
            return Err(ScmergeError::ShapeMismatch {
                context: "table index".into(),
                expected: self.len(),
                found: index.len(),
            });
        }
        Ok(Table {
            index,
            columns: self.columns.clone(),
        })
    }

    /// Subset rows to the given indices, in order.
    pub fn subset(&self, indices: &[usize]) -> Table {
        Table {
            index: indices.iter().map(|&i| self.index[i].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|(k, v)| (k.clone(), v.subset(indices)))
                .collect(),
        }
    }

    /// Stack `other` below `self`, taking the union of columns.
    ///
    /// Columns of `self` come first, then columns only `other` has. Rows
    /// lacking a column get that column's missing value. The index is the
    /// concatenation of both indices; duplicates are kept.
    pub fn vstack(&self, other: &Table) -> Table {
        let mut columns: Vec<(String, ColumnData)> = self
            .columns
            .iter()
            .map(|(name, col)| {
                let below = other
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| col.missing_like(other.len()));
                (name.clone(), col.concat(&below))
            })
            .collect();
        for (name, col) in &other.columns {
            if self.get(name).is_none() {
                let stacked = col.missing_like(self.len()).concat(col);
                columns.push((name.clone(), stacked));
            }
        }
        Table {
            index: self.index.iter().chain(&other.index).cloned().collect(),
            columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn insert_and_replace_keep_order() {
        let mut t = Table::new(ids(&["a", "b"]));
        t.insert("x", ColumnData::Numeric(vec![1.0, 2.0])).unwrap();
        t.insert("y", ColumnData::Strings(ids(&["p", "q"]))).unwrap();
        t.insert("x", ColumnData::Numeric(vec![3.0, 4.0])).unwrap();
        assert_eq!(t.column_names(), vec!["x", "y"]);
        assert_eq!(t.get("x").unwrap().as_numeric().unwrap(), &vec![3.0, 4.0]);
    }

    #[test]
    fn insert_length_mismatch() {
        let mut t = Table::new(ids(&["a", "b"]));
        assert!(t.insert("x", ColumnData::Numeric(vec![1.0])).is_err());
    }

    #[test]
    fn labels_skip_missing() {
        let col = ColumnData::Categorical {
            codes: vec![1, -1, 0],
            categories: ids(&["A", "B"]),
        };
        assert_eq!(
            col.labels(),
            vec![Some("B".to_string()), None, Some("A".to_string())]
        );
        let num = ColumnData::Numeric(vec![1.0, f64::NAN, 2.5]);
        assert_eq!(
            num.labels(),
            vec![Some("1".to_string()), None, Some("2.5".to_string())]
        );
    }

    #[test]
    fn categorical_concat_merges_categories() {
        let a = ColumnData::Categorical {
            codes: vec![0, 1],
            categories: ids(&["A", "B"]),
        };
        let b = ColumnData::Categorical {
            codes: vec![1, 0, -1],
            categories: ids(&["B", "C"]),
        };
        match a.concat(&b) {
            ColumnData::Categorical { codes, categories } => {
                assert_eq!(categories, ids(&["A", "B", "C"]));
                assert_eq!(codes, vec![0, 1, 2, 1, -1]);
            }
            other => panic!("expected categorical, got {other:?}"),
        }
    }

    #[test]
    fn mixed_kinds_concat_to_strings() {
        let a = ColumnData::Numeric(vec![1.0]);
        let b = ColumnData::Strings(ids(&["x"]));
        assert_eq!(a.concat(&b), ColumnData::Strings(ids(&["1", "x"])));
    }

    #[test]
    fn vstack_unions_columns() {
        let mut top = Table::new(ids(&["g1", "g2"]));
        top.insert("score", ColumnData::Numeric(vec![1.0, 2.0])).unwrap();
        top.insert("is_gene", ColumnData::constant_bool(2, true)).unwrap();
        let mut bottom = Table::new(ids(&["A"]));
        bottom.insert("is_celltype", ColumnData::constant_bool(1, true)).unwrap();

        let t = top.vstack(&bottom);
        assert_eq!(t.index(), &ids(&["g1", "g2", "A"])[..]);
        assert_eq!(t.column_names(), vec!["score", "is_gene", "is_celltype"]);
        let score = t.get("score").unwrap().as_numeric().unwrap();
        assert!(score[2].is_nan());
        assert_eq!(
            t.get("is_gene").unwrap().as_boolean().unwrap(),
            &vec![Some(true), Some(true), None]
        );
        assert_eq!(
            t.get("is_celltype").unwrap().as_boolean().unwrap(),
            &vec![None, None, Some(true)]
        );
    }

    #[test]
    fn fill_missing_bool_only_touches_none() {
        let mut col = ColumnData::Boolean(vec![Some(true), None, Some(false)]);
        col.fill_missing_bool(false);
        assert_eq!(col, ColumnData::Boolean(vec![Some(true), Some(false), Some(false)]));
    }

    #[test]
    fn with_index_and_subset() {
        let mut t = Table::new(ids(&["0", "1", "2"]));
        t.insert("label", ColumnData::Strings(ids(&["a", "b", "c"]))).unwrap();
        let shifted = t.with_index(ids(&["10", "11", "12"])).unwrap();
        assert_eq!(shifted.get("label"), t.get("label"));
        assert!(t.with_index(ids(&["10"])).is_err());

        let sub = t.subset(&[2, 0]);
        assert_eq!(sub.index(), &ids(&["2", "0"])[..]);
        assert_eq!(sub.get("label").unwrap().as_strings().unwrap(), &ids(&["c", "a"]));
    }

    #[test]
    fn unique_index_check() {
        assert!(Table::new(ids(&["a", "b"])).has_unique_index());
        assert!(!Table::new(ids(&["a", "a"])).has_unique_index());
    }
}
