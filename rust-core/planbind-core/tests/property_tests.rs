// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for statement normalization and binding identity.

use proptest::prelude::*;

use planbind_core::parser::normalize;
use planbind_core::{
    build_record, fingerprint, BindCache, BindRequest, BindStatus, DefaultSqlParser, SqlParser,
};

proptest! {
    /// Literal values never reach the normalized pattern.
    #[test]
    fn normalize_is_literal_insensitive(
        a in any::<i64>(),
        b in "[a-z0-9 ]{0,12}",
        c in 0u32..10_000,
        offset in 0u32..1000,
        count in 1u32..1000,
    ) {
        let sql = format!("select * from t where a = {a} and b > '{b}' and c in ({c}, {c}) limit {offset}, {count}");
        let normalized = normalize(&sql).unwrap();
        prop_assert_eq!(
            normalized.pattern,
            "select * from t where a = ? and b > ? and c in ( ... ) limit ..."
        );
    }

    /// Whitespace and keyword case do not change the pattern.
    #[test]
    fn normalize_ignores_layout(spaces in prop::collection::vec("[ \t\n]{1,3}", 6), upper in any::<bool>()) {
        let words = ["select", "a", "from", "t", "where", "a", "=", "1"];
        let mut sql = String::new();
        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                sql.push_str(&spaces[i % spaces.len()]);
            }
            if upper && i % 2 == 0 {
                sql.push_str(&word.to_uppercase());
            } else {
                sql.push_str(word);
            }
        }
        let normalized = normalize(&sql).unwrap();
        prop_assert_eq!(normalized.pattern, "select a from t where a = ?");
    }

    /// The digest is always the fingerprint of the pattern.
    #[test]
    fn digest_matches_pattern(col in "[a-z]{1,8}", value in any::<u16>()) {
        let sql = format!("select c_{col} from t where c_{col} < {value}");
        let normalized = DefaultSqlParser.normalize(&sql).unwrap();
        prop_assert_eq!(normalized.digest.len(), 64);
        prop_assert_eq!(&normalized.digest, &fingerprint(&normalized.pattern));
    }

    /// Bindings that differ only in literals share one identity.
    #[test]
    fn binding_identity_ignores_literals(x in any::<u32>(), y in any::<u32>()) {
        let now = chrono::Utc::now();
        let build = |v: u32| {
            let request = BindRequest::new(
                format!("select * from t where a > {v}"),
                format!("select * from t use index(idx_a) where a > {v}"),
                "test",
            );
            build_record(&DefaultSqlParser, &request, BindStatus::Using, now).unwrap()
        };
        let (rx, ry) = (build(x), build(y));
        prop_assert_eq!(&rx.original_sql, &ry.original_sql);
        prop_assert_eq!(&rx.bindings[0].id, &ry.bindings[0].id);

        let merged = rx.merge(&ry);
        prop_assert_eq!(merged.bindings.len(), 1);
    }

    /// A cache lookup only ever returns the exact `(pattern, db)` stored.
    #[test]
    fn cache_lookup_is_exact(dbs in prop::collection::btree_set("[a-z]{1,6}", 1..5)) {
        let now = chrono::Utc::now();
        let mut cache = BindCache::new();
        for db in &dbs {
            let request = BindRequest::new("select * from t", "select * from t use index(idx_a)", db.as_str());
            cache.set(build_record(&DefaultSqlParser, &request, BindStatus::Using, now).unwrap());
        }
        prop_assert_eq!(cache.len(), dbs.len());

        let key = normalize("select * from t").unwrap();
        for db in &dbs {
            let found = cache.get(&key.digest, &key.pattern, db).unwrap();
            prop_assert_eq!(&found.db, db);
        }
        prop_assert!(cache.get(&key.digest, &key.pattern, "not_a_db").is_none());
    }
}
