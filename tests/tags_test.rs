//! Tests for feature tagging helpers

use chrono::NaiveDate;
use serde_json::json;

use xyzmaps::tags::{
    add_datetime_properties, add_datetime_tags, add_tags_to_list, apply_tags, create_unique_id,
    file_stem, parse_datetime, replace_operators, split_keys, uniq, DateTagSelection,
    XYZ_NAMESPACE,
};

#[test]
fn test_add_tags_to_list_normalizes_value() {
    let mut tags = Vec::new();
    add_tags_to_list("Fish & Chips", "food type", &mut tags);
    add_tags_to_list("C++ #1,,Best", "lang", &mut tags);

    assert_eq!(tags[0], "food_type@fish__and__chips");
    assert_eq!(tags[1], "lang@c_plus___num_1_best");
}

#[test]
fn test_create_unique_id_skips_empty_values() {
    let feature = json!({
        "type": "Feature",
        "properties": {"a": "x", "b": "", "c": 7, "d": null}
    });

    assert_eq!(create_unique_id("a,b,c,d,missing", &feature), "x-7");
    assert_eq!(create_unique_id("b,d", &feature), "");
}

#[test]
fn test_split_keys() {
    assert_eq!(
        split_keys("a%%b%%c"),
        Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
    );
    assert_eq!(
        split_keys("left-right"),
        Some(vec!["left".to_string(), "right".to_string()])
    );
    assert_eq!(split_keys("a-b-c"), None);
    assert_eq!(split_keys("single"), None);
}

#[test]
fn test_replace_operators() {
    assert_eq!(replace_operators("p.a>=5+p.b<3"), "p.a=gte=5&p.b=lt=3");
    assert_eq!(replace_operators("p.a<=5"), "p.a=lte=5");
    assert_eq!(replace_operators("p.a>5"), "p.a=gt=5");
}

#[test]
fn test_uniq_preserves_first_occurrence() {
    assert_eq!(uniq(&["b", "a", "b", "c", "a"]), vec!["b", "a", "c"]);
}

#[test]
fn test_file_stem() {
    assert_eq!(file_stem("/tmp/data/roads.geojson").as_deref(), Some("roads"));
    assert_eq!(file_stem("archive.tar.gz").as_deref(), Some("archive.tar"));
    assert_eq!(file_stem("README").as_deref(), Some("README"));
}

#[test]
fn test_apply_tags_merges_and_dedupes() {
    let mut feature = json!({
        "type": "Feature",
        "properties": {XYZ_NAMESPACE: {"tags": ["old", "shared"]}}
    });

    apply_tags(&mut feature, &["shared".to_string(), "new".to_string()]);

    assert_eq!(
        feature["properties"][XYZ_NAMESPACE]["tags"],
        json!(["old", "shared", "new"])
    );
}

#[test]
fn test_apply_tags_creates_properties() {
    let mut feature = json!({"type": "Feature", "properties": null});
    apply_tags(&mut feature, &["t".to_string()]);
    assert_eq!(feature["properties"][XYZ_NAMESPACE]["tags"], json!(["t"]));

    let mut untouched = json!({"type": "Feature"});
    apply_tags(&mut untouched, &[]);
    assert!(untouched.get("properties").is_none());
}

#[test]
fn test_date_tag_selection_parse() {
    assert_eq!(DateTagSelection::parse(None), DateTagSelection::All);
    assert_eq!(DateTagSelection::parse(Some("")), DateTagSelection::All);
    assert_eq!(DateTagSelection::parse(Some("true")), DateTagSelection::All);
    assert_eq!(
        DateTagSelection::parse(Some("year, month")),
        DateTagSelection::Only(vec!["year".to_string(), "month".to_string()])
    );
}

#[test]
fn test_add_datetime_tags() {
    let date = NaiveDate::from_ymd_opt(2021, 3, 14)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();
    let mut tags = Vec::new();
    add_datetime_tags(&date, "created", &DateTagSelection::All, &mut tags);

    assert_eq!(
        tags,
        vec![
            "date_created_year@2021",
            "date_created_month@march",
            "date_created_year_month@2021-03",
            "date_created_week@12",
            "date_created_year_week@2021-12",
            "date_created_weekday@sunday",
            "date_created_hour@09",
        ]
    );
}

#[test]
fn test_add_datetime_properties_selected_only() {
    let date = NaiveDate::from_ymd_opt(2020, 12, 31)
        .unwrap()
        .and_hms_opt(23, 0, 0)
        .unwrap();
    let mut feature = json!({"type": "Feature", "properties": {}});
    add_datetime_properties(
        &date,
        "when",
        &DateTagSelection::Only(vec!["year".to_string(), "weekday".to_string()]),
        &mut feature,
    );

    assert_eq!(
        feature["properties"],
        json!({"date_when_year": "2020", "date_when_weekday": "Thursday"})
    );
}

#[test]
fn test_parse_datetime_formats() {
    let expected = NaiveDate::from_ymd_opt(2021, 3, 14)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap();

    assert_eq!(parse_datetime("2021-03-14T09:30:00"), Some(expected));
    assert_eq!(parse_datetime("2021-03-14 09:30:00"), Some(expected));
    assert_eq!(parse_datetime("2021-03-14T09:30:00Z"), Some(expected));
    assert_eq!(
        parse_datetime("2021-03-14"),
        NaiveDate::from_ymd_opt(2021, 3, 14).unwrap().and_hms_opt(0, 0, 0)
    );
    assert_eq!(parse_datetime("yesterday"), None);
}
