//! Compile whole expressions through the public API.

use pretty_assertions::assert_eq;
use serde_json::json;

use tagql::prelude::*;

fn demo_processor(dialect: Dialect) -> BaseSqlProcessor {
    let registry = Registry::standard();
    Catalog::demo()
        .unwrap()
        .install(&registry, PlaceholderStyle::Question)
        .unwrap();
    BaseSqlProcessor::new(Arc::new(registry), dialect.sql_dialect())
}

#[test]
fn test_gender_and_purchase() {
    let expr = tagql::parse_expression(
        r#"{"intersect": [
            {"tag": {"builderID": "user_gender", "params": {"operator": "EQ", "value": "MALE"}}},
            {"tag": {"builderID": "event_purchase", "params": {
                "accumulation": "COUNT",
                "countOperator": "GTE",
                "countValue": 1.0,
                "timeRange": "7D"
            }}}
        ]}"#,
    )
    .unwrap();

    let sql = demo_processor(Dialect::BigQuery)
        .process(&Context::with_request_id("e2e"), &expr)
        .unwrap();

    assert_eq!(
        compact_sql_query(&sql.query),
        "(SELECT user_id FROM users WHERE gender = ?) INTERSECT DISTINCT \
         (SELECT user_id FROM events WHERE event_name = 'PURCHASE' \
         AND created_at >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL 7 DAY) \
         GROUP BY user_id HAVING COUNT(1) >= ?)"
    );
    assert_eq!(sql.args, vec![json!("MALE"), json!(1.0)]);
}

#[test]
fn test_except_with_standard_dialect() {
    let expr = Expression::except(vec![
        Expression::tag(
            "user_age",
            json!({"operator": "BETWEEN", "min": 18, "max": 30})
                .as_object()
                .cloned()
                .unwrap(),
        ),
        Expression::tag(
            "user_country",
            json!({"operator": "IN", "values": "DE, FR"})
                .as_object()
                .cloned()
                .unwrap(),
        ),
    ]);

    let sql = demo_processor(Dialect::Postgres)
        .process(&Context::background(), &expr)
        .unwrap();
    assert_eq!(
        compact_sql_query(&sql.query),
        "(SELECT user_id FROM users WHERE age BETWEEN ? AND ?) EXCEPT \
         (SELECT user_id FROM users WHERE country IN (?, ?))"
    );
    assert_eq!(sql.args, vec![json!(18), json!(30), json!("DE"), json!("FR")]);
}

#[test]
fn test_simplify_before_compile() {
    let expr = tagql::parse_expression(
        r#"{"union": [
            {"union": [
                {"tag": {"builderID": "user_gender", "params": {
                    "operator": "EQ", "value": "FEMALE"
                }}},
                {"tag": {"builderID": "user_age", "params": {"operator": "LT", "value": 25}}}
            ]},
            {"tag": {"builderID": "event_login", "params": {
                "accumulation": "DAYS", "countOperator": "GT", "countValue": 3, "timeRange": "90D"
            }}}
        ]}"#,
    )
    .unwrap();

    let simplified = expr.simplify();
    assert_eq!(simplified.union.len(), 3);

    let processor = demo_processor(Dialect::BigQuery);
    let ctx = Context::background();
    let flat = processor.process(&ctx, &simplified).unwrap();
    let nested = processor.process(&ctx, &expr).unwrap();

    assert_eq!(flat.args, nested.args);
    assert_eq!(flat.query.matches("UNION DISTINCT").count(), 2);
    assert!(compact_sql_query(&flat.query).starts_with(
        "(SELECT user_id FROM users WHERE gender = ?) UNION DISTINCT \
         (SELECT user_id FROM users WHERE age < ?) UNION DISTINCT"
    ));
}

#[test]
fn test_invalid_params_are_client_errors() {
    let expr = tagql::parse_expression(
        r#"{"tag": {"builderID": "user_gender", "params": {
            "operator": "EQ", "value": "UNKNOWN"
        }}}"#,
    )
    .unwrap();
    let err = demo_processor(Dialect::BigQuery)
        .process(&Context::background(), &expr)
        .unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(
        err.to_string(),
        "failed to build SQL for tag user_gender: value for \"value\" contains an invalid option"
    );

    let unknown = tagql::parse_expression(r#"{"tag": {"builderID": "nope"}}"#).unwrap();
    let err = demo_processor(Dialect::BigQuery)
        .process(&Context::background(), &unknown)
        .unwrap_err();
    assert!(matches!(err, TagError::BuilderNotFound(id) if id == "nope"));

    assert!(tagql::parse_expression(r#"{"except": [{"tag": {"builderID": "a"}}]}"#).is_err());
}

#[test]
fn test_catalog_metadata_exposes_forms() {
    let registry = Registry::standard();
    Catalog::demo()
        .unwrap()
        .install(&registry, PlaceholderStyle::Question)
        .unwrap();

    let grouped = registry.get_categories_with_builders(&Context::background());
    let json = serde_json::to_value(&grouped).unwrap();

    assert_eq!(json[0]["id"], "demographics");
    let gender = &json[0]["builders"][0];
    assert_eq!(gender["id"], "user_gender");
    assert_eq!(gender["categoryID"], "demographics");
    assert_eq!(gender["view"]["fragments"][0]["type"], "SELECT");
    assert_eq!(gender["view"]["fragments"][0]["defaultValue"], "EQ");
    assert_eq!(gender["view"]["fragments"][2]["multiple"], true);

    let purchase = &json[1]["builders"][0];
    assert_eq!(purchase["name"], "Purchase Events");
    assert_eq!(purchase["view"]["fragments"].as_array().unwrap().len(), 9);
}

#[test]
fn test_config_drives_compilation() {
    let config =
        TagqlConfig::from_toml("dialect = \"snowflake\"\nplaceholder = \"dollar\"\n").unwrap();
    let registry = Registry::standard();
    Catalog::from_toml(
        r#"
[[builders]]
kind = "template"
id = "plan"
name = "Plan"
sql = "SELECT user_id FROM subscriptions WHERE plan IN ({{ argEach .plans }})"
"#,
    )
    .unwrap()
    .install(&registry, config.placeholder)
    .unwrap();

    let processor = BaseSqlProcessor::new(Arc::new(registry), config.dialect.sql_dialect());
    let expr = Expression::tag(
        "plan",
        json!({"plans": ["pro", "team"]}).as_object().cloned().unwrap(),
    );
    let sql = processor.process(&Context::background(), &expr).unwrap();
    assert_eq!(
        sql.query,
        "SELECT user_id FROM subscriptions WHERE plan IN ($1, $2)"
    );
}

#[test]
fn test_dollar_placeholders_number_across_tags() {
    let registry = Registry::standard();
    Catalog::demo()
        .unwrap()
        .install(&registry, PlaceholderStyle::Dollar)
        .unwrap();
    Catalog::from_toml(
        r#"
[[builders]]
kind = "template"
id = "plan"
name = "Plan"
sql = "SELECT user_id FROM subscriptions WHERE plan = {{ arg .plan }}"
"#,
    )
    .unwrap()
    .install(&registry, PlaceholderStyle::Dollar)
    .unwrap();
    let processor = BaseSqlProcessor::new(Arc::new(registry), Dialect::Postgres.sql_dialect());

    let expr = tagql::parse_expression(
        r#"{"union": [
            {"tag": {"builderID": "plan", "params": {"plan": "pro"}}},
            {"tag": {"builderID": "plan", "params": {"plan": "team"}}}
        ]}"#,
    )
    .unwrap();
    let sql = processor.process(&Context::background(), &expr).unwrap();
    assert_eq!(
        sql.query,
        "(SELECT user_id FROM subscriptions WHERE plan = $1) UNION \
         (SELECT user_id FROM subscriptions WHERE plan = $2)"
    );
    assert_eq!(sql.args, vec![json!("pro"), json!("team")]);

    let expr = tagql::parse_expression(
        r#"{"intersect": [
            {"tag": {"builderID": "user_age", "params": {
                "operator": "BETWEEN", "min": 18, "max": 30
            }}},
            {"tag": {"builderID": "plan", "params": {"plan": "pro"}}}
        ]}"#,
    )
    .unwrap();
    let sql = processor.process(&Context::background(), &expr).unwrap();
    assert_eq!(
        compact_sql_query(&sql.query),
        "(SELECT user_id FROM users WHERE age BETWEEN $1 AND $2) INTERSECT \
         (SELECT user_id FROM subscriptions WHERE plan = $3)"
    );
    assert!(!sql.query.contains('?'));
    assert_eq!(sql.args, vec![json!(18), json!(30), json!("pro")]);
}
