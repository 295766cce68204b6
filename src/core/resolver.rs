//! BK-003: ID resolution with per-table sequences and a named-ID registry.
//!
//! A [`RecipeManager`] owns one sequence counter per table and a registry of
//! named IDs per table. It walks bundles table by table, row by row, column
//! by column, replacing every token with a concrete integer. State
//! accumulates across every bundle prepared by the same manager, so IDs stay
//! unique per table across a whole run.
//!
//! Auto-increment tokens and named IDs draw from the same per-table counter.

use super::error::{BakeryError, Result};
use super::tokens::{NamedId, NamedIdRef, TokenKey};
use super::types::{
    NamedIdExport, NamedIdExportMap, RecipeBundle, ResolvedBundle, ResolvedRow, Row, SqlValue,
    Value,
};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::fmt;

/// Produces the default columns for one row of a table.
pub type TableDefaultFn = Box<dyn Fn() -> Row>;

/// Construction options for a [`RecipeManager`].
#[derive(Default)]
pub struct RecipeManagerConfig {
    /// Per-table default columns, merged under every row of that table
    pub table_defaults: IndexMap<String, TableDefaultFn>,

    /// First sequence value per table (tables not listed start at 1)
    pub table_start_ids: HashMap<String, i64>,
}

/// Registry entry for one named ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NamedIdStatus {
    id_value: i64,
    /// Allocated by a forward reference; no real definition seen yet.
    is_placeholder: bool,
}

/// Generates and tracks IDs across every recipe bundle of a run.
pub struct RecipeManager {
    /// Last issued sequence value, keyed by table
    table_auto_inc_ids: HashMap<String, i64>,
    table_start_ids: HashMap<String, i64>,
    /// Named IDs per table, in first-seen order
    table_named_ids: IndexMap<String, IndexMap<String, NamedIdStatus>>,
    table_defaults: IndexMap<String, TableDefaultFn>,
    /// Values already issued to token instances
    resolved_tokens: FxHashMap<TokenKey, i64>,
}

impl RecipeManager {
    pub fn new(config: RecipeManagerConfig) -> Self {
        Self {
            table_auto_inc_ids: HashMap::new(),
            table_start_ids: config.table_start_ids,
            table_named_ids: IndexMap::new(),
            table_defaults: config.table_defaults,
            resolved_tokens: FxHashMap::default(),
        }
    }

    /// Issue the next sequence value for a table.
    ///
    /// Fails once the sequence would pass `i64::MAX`.
    pub fn next_auto_inc_for_table(&mut self, table: &str) -> Result<i64> {
        let next = match self.table_auto_inc_ids.get(table) {
            Some(&last) => last.checked_add(1).ok_or_else(|| BakeryError::SequenceExhausted {
                table: table.to_string(),
                last,
            })?,
            None => self.table_start_ids.get(table).copied().unwrap_or(1),
        };
        self.table_auto_inc_ids.insert(table.to_string(), next);
        Ok(next)
    }

    /// Read the value of a named ID, allocating a placeholder if the name has
    /// not been seen in `table` yet.
    pub fn get_named_id(&mut self, table: &str, name: &str) -> Result<i64> {
        if let Some(status) = self.named_status(table, name) {
            return Ok(status.id_value);
        }

        let id_value = self.next_auto_inc_for_table(table)?;
        tracing::debug!(table, name, id_value, "named ID referenced before definition");
        self.table_named_ids
            .entry(table.to_string())
            .or_default()
            .insert(
                name.to_string(),
                NamedIdStatus {
                    id_value,
                    is_placeholder: true,
                },
            );
        Ok(id_value)
    }

    /// Resolve a real definition of `named` in `table`.
    fn define_named_id(&mut self, table: &str, named: &NamedId) -> Result<i64> {
        if let Some(&value) = self.resolved_tokens.get(&named.key()) {
            return Ok(value);
        }

        let id_value = match self.named_status(table, named.name()) {
            Some(status) if !status.is_placeholder => {
                return Err(BakeryError::DuplicateNamedId {
                    table: table.to_string(),
                    name: named.name().to_string(),
                });
            }
            Some(status) => status.id_value,
            None => self.next_auto_inc_for_table(table)?,
        };

        self.table_named_ids
            .entry(table.to_string())
            .or_default()
            .insert(
                named.name().to_string(),
                NamedIdStatus {
                    id_value,
                    is_placeholder: false,
                },
            );
        self.resolved_tokens.insert(named.key(), id_value);
        Ok(id_value)
    }

    fn named_status(&self, table: &str, name: &str) -> Option<NamedIdStatus> {
        self.table_named_ids
            .get(table)
            .and_then(|names| names.get(name))
            .copied()
    }

    /// Retrieve every named ID, grouped by table, ready for exporting.
    ///
    /// Names only ever reached through a forward reference are included with
    /// the value allocated for them.
    pub fn get_generated_named_ids(&self) -> NamedIdExportMap {
        self.table_named_ids
            .iter()
            .map(|(table, names)| {
                let exported = names
                    .iter()
                    .map(|(name, status)| {
                        (
                            name.clone(),
                            NamedIdExport {
                                id: status.id_value,
                            },
                        )
                    })
                    .collect();
                (table.clone(), exported)
            })
            .collect()
    }

    /// Merge the table's default columns under the row. Row values win.
    pub fn add_default_fields_to_row(&self, table: &str, row: Row) -> Row {
        let Some(defaults) = self.table_defaults.get(table) else {
            return row;
        };

        let mut merged = defaults();
        for (column, value) in row {
            merged.insert(column, value);
        }
        merged
    }

    /// Resolve every token in a bundle.
    ///
    /// Tables are processed in bundle order and rows in list order, which
    /// fixes the order in which sequence values are issued.
    pub fn prepare_recipe(&mut self, bundle: RecipeBundle) -> Result<ResolvedBundle> {
        let mut prepared = ResolvedBundle::with_capacity(bundle.len());

        for (table, rows) in bundle {
            let resolved_rows = rows
                .into_iter()
                .map(|row| self.prepare_row(&table, row))
                .collect::<Result<Vec<_>>>()?;
            prepared.insert(table, resolved_rows);
        }

        Ok(prepared)
    }

    fn prepare_row(&mut self, table: &str, row: Row) -> Result<ResolvedRow> {
        let merged = self.add_default_fields_to_row(table, row);
        let mut resolved = ResolvedRow::with_capacity(merged.len());

        for (column, value) in merged {
            let sql_value = match value {
                Value::Literal(v) => v,
                Value::AutoInc(token) => {
                    let id = match self.resolved_tokens.get(&token.key()) {
                        Some(&id) => id,
                        None => {
                            let id = self.next_auto_inc_for_table(table)?;
                            self.resolved_tokens.insert(token.key(), id);
                            id
                        }
                    };
                    SqlValue::Int(id)
                }
                Value::Named(named) => SqlValue::Int(self.define_named_id(table, &named)?),
                Value::NamedRef(NamedIdRef { table: ref_table, name }) => {
                    SqlValue::Int(self.get_named_id(&ref_table, &name)?)
                }
            };
            resolved.insert(column, sql_value);
        }

        Ok(resolved)
    }
}

impl Default for RecipeManager {
    fn default() -> Self {
        Self::new(RecipeManagerConfig::default())
    }
}

impl fmt::Debug for RecipeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipeManager")
            .field("table_auto_inc_ids", &self.table_auto_inc_ids)
            .field("table_start_ids", &self.table_start_ids)
            .field("table_named_ids", &self.table_named_ids)
            .field(
                "table_defaults",
                &self.table_defaults.keys().collect::<Vec<_>>(),
            )
            .field("resolved_tokens", &self.resolved_tokens.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tokens::{get_named_id, AutoIncId, RawSql};
    use crate::core::types::row;

    fn int(n: i64) -> SqlValue {
        SqlValue::Int(n)
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    fn ids(bundle: &ResolvedBundle, table: &str, column: &str) -> Vec<SqlValue> {
        bundle[table].iter().map(|r| r[column].clone()).collect()
    }

    #[test]
    fn test_bk003_literal_bundles_pass_through() {
        let bundles = vec![
            RecipeBundle::from([
                (
                    "user".to_string(),
                    vec![row([
                        ("id", Value::from(1)),
                        ("email", Value::from("hi@there.com")),
                        ("firstName", Value::from("Eric")),
                    ])],
                ),
                (
                    "orders".to_string(),
                    vec![
                        row([("id", Value::from(100)), ("amount", Value::from(5000))]),
                        row([("id", Value::from(101)), ("amount", Value::from(15000))]),
                    ],
                ),
            ]),
            RecipeBundle::from([(
                "user".to_string(),
                vec![row([("id", Value::from(2)), ("email", Value::from("bob@example.com"))])],
            )]),
        ];

        let mut manager = RecipeManager::default();
        let prepared: Vec<_> = bundles
            .into_iter()
            .map(|b| manager.prepare_recipe(b).unwrap())
            .collect();

        assert_eq!(prepared.len(), 2);
        assert_eq!(ids(&prepared[0], "orders", "id"), vec![int(100), int(101)]);
        assert_eq!(prepared[1]["user"][0]["email"], text("bob@example.com"));
        assert!(manager.get_generated_named_ids().is_empty());
    }

    #[test]
    fn test_bk003_end_to_end_named_and_auto() {
        let bundle = RecipeBundle::from([(
            "user".to_string(),
            vec![
                row([
                    ("id", Value::from(AutoIncId::new())),
                    ("email", Value::from("a@b.com")),
                ]),
                row([
                    ("id", Value::from(NamedId::new("special"))),
                    ("email", Value::from("c@d.com")),
                ]),
            ],
        )]);

        let mut manager = RecipeManager::default();
        let prepared = manager.prepare_recipe(bundle).unwrap();

        assert_eq!(ids(&prepared, "user", "id"), vec![int(1), int(2)]);
        let exported = manager.get_generated_named_ids();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported["user"]["special"], NamedIdExport { id: 2 });
    }

    #[test]
    fn test_bk003_shared_auto_inc_tokens() {
        let user_id = AutoIncId::new();
        let product_1 = AutoIncId::new();
        let product_2 = AutoIncId::new();

        let bundle = RecipeBundle::from([
            (
                "user".to_string(),
                vec![row([("id", Value::from(user_id)), ("email", Value::from("hi@there.com"))])],
            ),
            (
                "products".to_string(),
                vec![
                    row([("productId", Value::from(product_1)), ("name", Value::from("Bread"))]),
                    row([("productId", Value::from(product_2)), ("name", Value::from("Cheese"))]),
                ],
            ),
            (
                "orders".to_string(),
                vec![
                    row([
                        ("userId", Value::from(user_id)),
                        ("productId", Value::from(product_1)),
                        ("amount", Value::from(5)),
                    ]),
                    row([
                        ("userId", Value::from(user_id)),
                        ("productId", Value::from(product_2)),
                        ("amount", Value::from(3)),
                    ]),
                ],
            ),
        ]);

        let mut manager = RecipeManager::new(RecipeManagerConfig {
            table_start_ids: HashMap::from([("products".to_string(), 501)]),
            ..Default::default()
        });
        let prepared = manager.prepare_recipe(bundle).unwrap();

        assert_eq!(ids(&prepared, "user", "id"), vec![int(1)]);
        assert_eq!(ids(&prepared, "products", "productId"), vec![int(501), int(502)]);
        assert_eq!(ids(&prepared, "orders", "userId"), vec![int(1), int(1)]);
        assert_eq!(ids(&prepared, "orders", "productId"), vec![int(501), int(502)]);
        assert_eq!(ids(&prepared, "orders", "amount"), vec![int(5), int(3)]);
    }

    #[test]
    fn test_bk003_named_ids_share_counter() {
        let bundle = RecipeBundle::from([
            (
                "user".to_string(),
                vec![
                    row([("id", Value::from(AutoIncId::new()))]),
                    row([("id", Value::from(NamedId::new("specialUser")))]),
                    row([("id", Value::from(AutoIncId::new()))]),
                    row([("id", Value::from(NamedId::new("someOtherName")))]),
                ],
            ),
            (
                "orders".to_string(),
                vec![
                    row([
                        ("userId", Value::from(get_named_id("user", "specialUser"))),
                        ("productId", Value::from(NamedId::new("myProduct"))),
                    ]),
                    row([
                        ("userId", Value::from(get_named_id("user", "someOtherName"))),
                        ("productId", Value::from(AutoIncId::new())),
                    ]),
                ],
            ),
        ]);

        let mut manager = RecipeManager::default();
        let prepared = manager.prepare_recipe(bundle).unwrap();

        assert_eq!(
            ids(&prepared, "user", "id"),
            vec![int(1), int(2), int(3), int(4)]
        );
        assert_eq!(ids(&prepared, "orders", "userId"), vec![int(2), int(4)]);
        assert_eq!(ids(&prepared, "orders", "productId"), vec![int(1), int(2)]);

        let exported = manager.get_generated_named_ids();
        assert_eq!(exported["user"]["specialUser"].id, 2);
        assert_eq!(exported["user"]["someOtherName"].id, 4);
        assert_eq!(exported["orders"]["myProduct"].id, 1);
    }

    #[test]
    fn test_bk003_forward_reference_placeholder() {
        let bundle = RecipeBundle::from([
            (
                "orders".to_string(),
                vec![
                    row([
                        ("userId", Value::from(get_named_id("user", "specialUser"))),
                        ("productId", Value::from(NamedId::new("myProduct"))),
                    ]),
                    row([
                        ("userId", Value::from(get_named_id("user", "specialUser"))),
                        ("productId", Value::from(AutoIncId::new())),
                    ]),
                ],
            ),
            (
                "user".to_string(),
                vec![row([("id", Value::from(NamedId::new("specialUser")))])],
            ),
        ]);

        let mut manager = RecipeManager::default();
        let prepared = manager.prepare_recipe(bundle).unwrap();

        assert_eq!(ids(&prepared, "orders", "userId"), vec![int(1), int(1)]);
        assert_eq!(ids(&prepared, "orders", "productId"), vec![int(1), int(2)]);
        assert_eq!(ids(&prepared, "user", "id"), vec![int(1)]);
    }

    #[test]
    fn test_bk003_forward_reference_equivalence() {
        let define = || row([("id", Value::from(NamedId::new("target")))]);
        let reference = || row([("ref", Value::from(get_named_id("user", "target")))]);

        let mut before = RecipeManager::default();
        let a = before
            .prepare_recipe(RecipeBundle::from([
                ("links".to_string(), vec![reference()]),
                ("user".to_string(), vec![define()]),
            ]))
            .unwrap();

        let mut after = RecipeManager::default();
        let b = after
            .prepare_recipe(RecipeBundle::from([
                ("user".to_string(), vec![define()]),
                ("links".to_string(), vec![reference()]),
            ]))
            .unwrap();

        assert_eq!(a["links"][0]["ref"], b["links"][0]["ref"]);
        assert_eq!(a["user"][0]["id"], b["user"][0]["id"]);
        assert_eq!(
            before.get_generated_named_ids(),
            after.get_generated_named_ids()
        );
    }

    #[test]
    fn test_bk003_duplicate_named_id_errors() {
        let bundle = RecipeBundle::from([(
            "orders".to_string(),
            vec![
                row([("userId", Value::from(NamedId::new("duplicate")))]),
                row([("userId", Value::from(NamedId::new("duplicate")))]),
            ],
        )]);

        let mut manager = RecipeManager::default();
        let err = manager.prepare_recipe(bundle).unwrap_err();
        match err {
            BakeryError::DuplicateNamedId { table, name } => {
                assert_eq!(table, "orders");
                assert_eq!(name, "duplicate");
            }
            other => panic!("expected DuplicateNamedId, got {:?}", other),
        }
    }

    #[test]
    fn test_bk003_duplicate_across_bundles_errors() {
        let mut manager = RecipeManager::default();
        let make = || {
            RecipeBundle::from([(
                "user".to_string(),
                vec![row([("id", Value::from(NamedId::new("admin")))])],
            )])
        };
        manager.prepare_recipe(make()).unwrap();
        assert!(manager.prepare_recipe(make()).is_err());
    }

    #[test]
    fn test_bk003_same_named_instance_reused() {
        let admin = NamedId::new("admin");
        let bundle = RecipeBundle::from([(
            "user".to_string(),
            vec![
                row([("id", Value::from(admin.clone())), ("self_id", Value::from(admin.clone()))]),
                row([("id", Value::from(AutoIncId::new())), ("manager_id", Value::from(admin))]),
            ],
        )]);

        let mut manager = RecipeManager::default();
        let prepared = manager.prepare_recipe(bundle).unwrap();
        assert_eq!(prepared["user"][0]["id"], int(1));
        assert_eq!(prepared["user"][0]["self_id"], int(1));
        assert_eq!(prepared["user"][1]["id"], int(2));
        assert_eq!(prepared["user"][1]["manager_id"], int(1));
    }

    #[test]
    fn test_bk003_named_ids_scoped_per_table() {
        let bundle = RecipeBundle::from([
            (
                "user".to_string(),
                vec![
                    row([("id", Value::from(AutoIncId::new()))]),
                    row([("id", Value::from(NamedId::new("main")))]),
                ],
            ),
            (
                "company".to_string(),
                vec![row([("id", Value::from(NamedId::new("main")))])],
            ),
        ]);

        let mut manager = RecipeManager::default();
        let prepared = manager.prepare_recipe(bundle).unwrap();
        assert_eq!(prepared["user"][1]["id"], int(2));
        assert_eq!(prepared["company"][0]["id"], int(1));
    }

    #[test]
    fn test_bk003_placeholder_only_is_exported() {
        let mut manager = RecipeManager::default();
        assert_eq!(manager.get_named_id("user", "ghost").unwrap(), 1);
        assert_eq!(manager.get_named_id("user", "ghost").unwrap(), 1);
        assert_eq!(manager.next_auto_inc_for_table("user").unwrap(), 2);

        let exported = manager.get_generated_named_ids();
        assert_eq!(exported["user"]["ghost"].id, 1);
    }

    #[test]
    fn test_bk003_reference_after_definition_keeps_real_status() {
        let mut manager = RecipeManager::default();
        manager
            .prepare_recipe(RecipeBundle::from([(
                "user".to_string(),
                vec![row([("id", Value::from(NamedId::new("x")))])],
            )]))
            .unwrap();
        assert_eq!(manager.get_named_id("user", "x").unwrap(), 1);

        // Still a real definition: a second one must fail
        let again = RecipeBundle::from([(
            "user".to_string(),
            vec![row([("id", Value::from(NamedId::new("x")))])],
        )]);
        assert!(manager.prepare_recipe(again).is_err());
    }

    #[test]
    fn test_bk003_table_defaults_merge_under_row() {
        let mut table_defaults: IndexMap<String, TableDefaultFn> = IndexMap::new();
        table_defaults.insert(
            "user".to_string(),
            Box::new(|| {
                row([
                    ("id", Value::from(AutoIncId::new())),
                    ("otherField", Value::from("Ahoy")),
                ])
            }),
        );

        let mut manager = RecipeManager::new(RecipeManagerConfig {
            table_defaults,
            ..Default::default()
        });

        let first = manager
            .prepare_recipe(RecipeBundle::from([(
                "user".to_string(),
                vec![row([("email", Value::from("eric@email.com"))])],
            )]))
            .unwrap();
        let second = manager
            .prepare_recipe(RecipeBundle::from([(
                "user".to_string(),
                vec![row([
                    ("email", Value::from("bob@test.com")),
                    ("otherField", Value::from("Hello")),
                ])],
            )]))
            .unwrap();

        assert_eq!(first["user"][0]["id"], int(1));
        assert_eq!(first["user"][0]["otherField"], text("Ahoy"));
        assert_eq!(second["user"][0]["id"], int(2));
        assert_eq!(second["user"][0]["otherField"], text("Hello"));

        let columns: Vec<_> = first["user"][0].keys().cloned().collect();
        assert_eq!(columns, vec!["id", "otherField", "email"]);
    }

    #[test]
    fn test_bk003_raw_and_null_pass_through() {
        let bundle = RecipeBundle::from([(
            "user".to_string(),
            vec![row([
                ("created", Value::from(RawSql::new("CURDATE()"))),
                ("deleted", Value::null()),
                ("active", Value::from(true)),
            ])],
        )]);
        let prepared = RecipeManager::default().prepare_recipe(bundle).unwrap();
        let r = &prepared["user"][0];
        assert_eq!(r["created"], SqlValue::Raw("CURDATE()".into()));
        assert_eq!(r["deleted"], SqlValue::Null);
        assert_eq!(r["active"], SqlValue::Bool(true));
    }

    #[test]
    fn test_bk003_counters_accumulate_across_bundles() {
        let mut manager = RecipeManager::default();
        for expected in 1..=3 {
            let prepared = manager
                .prepare_recipe(RecipeBundle::from([(
                    "user".to_string(),
                    vec![row([("id", Value::from(AutoIncId::new()))])],
                )]))
                .unwrap();
            assert_eq!(prepared["user"][0]["id"], int(expected));
        }
    }

    #[test]
    fn test_bk003_debug_lists_default_tables() {
        let mut table_defaults: IndexMap<String, TableDefaultFn> = IndexMap::new();
        table_defaults.insert("user".to_string(), Box::new(Row::new));
        let manager = RecipeManager::new(RecipeManagerConfig {
            table_defaults,
            ..Default::default()
        });
        assert!(format!("{:?}", manager).contains("\"user\""));
    }

    #[test]
    fn test_bk003_sequence_exhaustion_is_an_error() {
        let mut manager = RecipeManager::new(RecipeManagerConfig {
            table_start_ids: HashMap::from([("t".to_string(), i64::MAX)]),
            ..Default::default()
        });
        assert_eq!(manager.next_auto_inc_for_table("t").unwrap(), i64::MAX);
        match manager.next_auto_inc_for_table("t") {
            Err(BakeryError::SequenceExhausted { table, last }) => {
                assert_eq!(table, "t");
                assert_eq!(last, i64::MAX);
            }
            other => panic!("expected SequenceExhausted, got {:?}", other),
        }

        // Through a bundle the error aborts the resolution
        let bundle = RecipeBundle::from([(
            "t".to_string(),
            vec![row([("id", Value::from(AutoIncId::new()))])],
        )]);
        assert!(matches!(
            manager.prepare_recipe(bundle),
            Err(BakeryError::SequenceExhausted { .. })
        ));
        assert!(matches!(
            manager.get_named_id("t", "late"),
            Err(BakeryError::SequenceExhausted { .. })
        ));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn sequence_is_contiguous_from_start(
                start in -1000i64..1_000_000,
                kinds in proptest::collection::vec(0u8..3, 1..40),
            ) {
                let rows: Vec<Row> = kinds
                    .iter()
                    .enumerate()
                    .map(|(i, kind)| {
                        let v = match kind {
                            0 => Value::from(AutoIncId::new()),
                            1 => Value::from(NamedId::new(format!("n{}", i))),
                            _ => Value::from(get_named_id("t", format!("r{}", i))),
                        };
                        row([("id", v)])
                    })
                    .collect();

                let mut manager = RecipeManager::new(RecipeManagerConfig {
                    table_start_ids: HashMap::from([("t".to_string(), start)]),
                    ..Default::default()
                });
                let prepared = manager
                    .prepare_recipe(RecipeBundle::from([("t".to_string(), rows)]))
                    .unwrap();

                for (i, r) in prepared["t"].iter().enumerate() {
                    prop_assert_eq!(&r["id"], &SqlValue::Int(start + i as i64));
                }
            }

            #[test]
            fn token_copies_resolve_identically(uses in 1usize..20) {
                let token = AutoIncId::new();
                let rows: Vec<Row> = (0..uses)
                    .map(|_| row([("a", Value::from(token)), ("b", Value::from(token))]))
                    .collect();
                let prepared = RecipeManager::default()
                    .prepare_recipe(RecipeBundle::from([("t".to_string(), rows)]))
                    .unwrap();
                for r in &prepared["t"] {
                    prop_assert_eq!(&r["a"], &SqlValue::Int(1));
                    prop_assert_eq!(&r["b"], &SqlValue::Int(1));
                }
            }
        }
    }
}
