use proptest::prelude::*;
use specnorm_core::{
    CanonicalField, CanonicalMapper, CanonicalValue, PatternLibrary, RawSpecMap, RawValue,
    ShapeTag, ValueParser, ValueShape,
};

fn comparator() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just(""),
        Just(">"),
        Just("≥"),
        Just("<"),
        Just("≤"),
        Just("> "),
        Just("≥ "),
    ]
}

fn ratio() -> impl Strategy<Value = (String, u32, u32)> {
    (comparator(), 1u32..100_000, 1u32..1_000, any::<bool>()).prop_map(|(cmp, n, m, spaced)| {
        let body = if spaced {
            format!("{n} : {m}")
        } else {
            format!("{n}:{m}")
        };
        (format!("{cmp}{body}"), n, m)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn ratio_is_one_atomic_shape((raw, n, m) in ratio()) {
        let recognized = PatternLibrary::standard().recognize(&raw).expect("ratio recognized");
        prop_assert_eq!(recognized.shape.tag(), ShapeTag::Ratio);
        match recognized.shape {
            ValueShape::Ratio { text, .. } => prop_assert_eq!(text, format!("{n}:{m}")),
            other => prop_assert!(false, "unexpected shape {:?}", other),
        }
    }

    #[test]
    fn ratio_survives_mapping_and_parsing((raw, n, m) in ratio()) {
        let mut map = RawSpecMap::new();
        map.insert("PER", raw.as_str());
        prop_assert_eq!(map.len(), 1);
        let entry = map.get("per").expect("key kept whole");
        prop_assert_eq!(&entry.value, &RawValue::Single(raw.clone()));

        let field = CanonicalMapper::default().map_cleaned("per").expect("PER maps");
        prop_assert_eq!(field, CanonicalField::PolarizationRatio);

        let parsed = ValueParser::default().parse(field, &raw, None).expect("ratio parses");
        prop_assert_eq!(parsed.value, CanonicalValue::Text(format!("{n}:{m}")));
        prop_assert_eq!(parsed.verbatim, raw.trim());
    }
}

#[test]
fn inequality_ratio_example() {
    let parsed = ValueParser::default()
        .parse(CanonicalField::PolarizationRatio, "> 100:1", None)
        .unwrap();
    assert_eq!(parsed.value, CanonicalValue::Text("100:1".into()));
    assert_eq!(parsed.verbatim, "> 100:1");
}
