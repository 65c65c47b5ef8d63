use std::collections::HashSet;

use proptest::prelude::*;
use svg2tvg::decode::decode;
use svg2tvg::encode::initial_scale;
use svg2tvg::format::{Color, Command, Image, Style};
use svg2tvg::style::{apply_opacity, parse_color};
use svg2tvg::tree::{Attributes, Document, NodeKind};
use svg2tvg::{convert, convert_svg};

fn fill_indices(image: &Image) -> Vec<usize> {
    image
        .commands
        .iter()
        .filter_map(|command| match command {
            Command::FillRectangles { fill_style, .. }
            | Command::FillPath { fill_style, .. }
            | Command::FillPolygon { fill_style, .. } => Some(fill_style),
            _ => None,
        })
        .map(|style| match style {
            Style::FlatColor { color_index } => *color_index,
            other => panic!("unexpected style {:?}", other),
        })
        .collect()
}

/// Canvas size and rectangle origins inside it
fn arb_placements() -> impl Strategy<Value = (u32, Vec<(f64, f64)>)> {
    (1u32..=4000).prop_flat_map(|size| {
        let coordinate = 0.0..f64::from(size);
        (
            Just(size),
            prop::collection::vec((coordinate.clone(), coordinate), 1..20),
        )
    })
}

/// Few distinct channel and opacity values so that colors collide often
fn arb_paint() -> impl Strategy<Value = (String, f64, f64)> {
    let channel = || prop::sample::select(vec![0x00u8, 0x80, 0xff]);
    let opacity = || prop::sample::select(vec![0.25, 0.5, 1.0]);
    let color = prop_oneof![
        4 => (channel(), channel(), channel())
            .prop_map(|(r, g, b)| format!("#{:02x}{:02x}{:02x}", r, g, b)),
        1 => prop::sample::select(vec!["#dark", "#middle", "#light"]).prop_map(str::to_owned),
    ];

    (color, opacity(), opacity())
}

proptest! {
    #[test]
    fn coordinates_round_trip_within_quantization_step((size, origins) in arb_placements()) {
        let mut document = Document::new(size, size);
        let root = document.root();
        for &(x, y) in &origins {
            document
                .append(root, Attributes::default(), NodeKind::rectangle(x, y, 1.0, 1.0))
                .unwrap();
        }

        let conversion = convert(&document).unwrap();
        let image = decode(&conversion.bytes).unwrap();
        let step = 0.5 / f64::from(1u32 << conversion.scale);

        prop_assert_eq!(image.commands.len(), origins.len());
        for ((x, y), command) in origins.iter().zip(&image.commands) {
            let rect = match command {
                Command::FillRectangles { rectangles, .. } => rectangles[0],
                other => panic!("unexpected command {:?}", other),
            };
            prop_assert!((x - rect.x0).abs() <= step, "x {} decoded as {}", x, rect.x0);
            prop_assert!((y - rect.y0).abs() <= step, "y {} decoded as {}", y, rect.y0);
        }
    }

    #[test]
    fn color_indices_reference_resolved_colors(paints in prop::collection::vec(arb_paint(), 1..12)) {
        let mut document = Document::new(32, 32);
        let root = document.root();
        for (i, (fill, opacity, fill_opacity)) in paints.iter().enumerate() {
            let attributes = Attributes {
                fill: Some(fill.clone()),
                opacity: Some(*opacity),
                fill_opacity: Some(*fill_opacity),
                ..Attributes::default()
            };
            document
                .append(root, attributes, NodeKind::rectangle(i as f64, 0.0, 1.0, 1.0))
                .unwrap();
        }

        let bytes = convert(&document).unwrap().bytes;
        let again = convert(&document).unwrap().bytes;
        prop_assert_eq!(&bytes, &again);

        let expected: Vec<Color> = paints
            .iter()
            .map(|(fill, opacity, fill_opacity)| {
                apply_opacity(&parse_color(fill).unwrap(), opacity * fill_opacity)
            })
            .collect();

        // first occurrences, in document order
        let mut seen = HashSet::new();
        let table: Vec<_> = expected
            .iter()
            .map(Color::as_rgba8)
            .filter(|rgba| seen.insert(*rgba))
            .collect();

        let image = decode(&bytes).unwrap();
        let decoded_table: Vec<_> = image.color_table.iter().map(Color::as_rgba8).collect();
        prop_assert_eq!(image.header.color_count as usize, image.color_table.len());
        prop_assert_eq!(decoded_table, table);

        let indices = fill_indices(&image);
        prop_assert_eq!(indices.len(), expected.len());
        for (color, index) in expected.iter().zip(indices) {
            prop_assert_eq!(image.color_table[index].as_rgba8(), color.as_rgba8());
        }
    }

    #[test]
    fn retry_stops_at_the_finest_fitting_scale(width in 1u16..=4000, coordinate in 0.0..30000.0f64) {
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{w}"><path d="M0 0 L{c} 1"/></svg>"#,
            w = width,
            c = coordinate
        );

        let (conversion, _) = convert_svg(&svg).unwrap();
        let initial = initial_scale(width, width);
        let units = |scale: u8| (coordinate * f64::from(1u32 << scale)).round();

        prop_assert!(conversion.scale <= initial);
        prop_assert_eq!(u32::from(initial - conversion.scale) + 1, conversion.attempts);
        prop_assert!(units(conversion.scale) <= f64::from(i16::MAX));
        if conversion.scale < initial {
            prop_assert!(units(conversion.scale + 1) > f64::from(i16::MAX));
        }
    }
}

#[test]
fn view_box_is_mapped_onto_the_canvas() {
    let (conversion, _) = convert_svg(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="-12 -12 48 48"><rect x="-12" y="12" width="24" height="12"/></svg>"#,
    )
    .unwrap();
    let image = decode(&conversion.bytes).unwrap();

    match &image.commands[0] {
        Command::FillRectangles { rectangles, .. } => {
            let rect = rectangles[0];
            assert_eq!((rect.x0, rect.y0), (0.0, 12.0));
            assert_eq!((rect.width(), rect.height()), (12.0, 6.0));
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn fills_inherit_from_the_nearest_ancestor() {
    let mut document = Document::new(16, 16);
    let root = document.root();

    let outer = document
        .append(
            root,
            Attributes::default().with_fill("#112233"),
            NodeKind::Group { children: vec![] },
        )
        .unwrap();
    let inner = document
        .append(
            outer,
            Attributes::default().with_fill("#445566"),
            NodeKind::Group { children: vec![] },
        )
        .unwrap();
    let plain = document
        .append(root, Attributes::default(), NodeKind::Group { children: vec![] })
        .unwrap();

    for parent in [outer, inner, plain] {
        document
            .append(parent, Attributes::default(), NodeKind::rectangle(0.0, 0.0, 1.0, 1.0))
            .unwrap();
    }

    // document order visits the inner group before the outer group's own rectangle
    let image = decode(&convert(&document).unwrap().bytes).unwrap();
    let colors: Vec<_> = fill_indices(&image)
        .into_iter()
        .map(|index| image.color_table[index].as_rgba8())
        .collect();

    assert_eq!(
        colors,
        vec![
            (0x44, 0x55, 0x66, 0xff),
            (0x11, 0x22, 0x33, 0xff),
            (0x00, 0x00, 0x00, 0xff),
        ]
    );
}

#[test]
fn many_subpaths_are_split_into_records() {
    let data: String = (0..130).map(|i| format!("M{} 0 l1 1 ", i % 30)).collect();

    let mut document = Document::new(32, 32);
    let root = document.root();
    document
        .append(root, Attributes::default(), NodeKind::path(data))
        .unwrap();

    let image = decode(&convert(&document).unwrap().bytes).unwrap();
    let lengths: Vec<_> = image
        .commands
        .iter()
        .map(|command| match command {
            Command::FillPath { path, .. } => path.len(),
            other => panic!("unexpected command {:?}", other),
        })
        .collect();

    assert_eq!(lengths, vec![64, 64, 2]);
}
