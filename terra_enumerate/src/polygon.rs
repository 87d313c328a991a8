use anyhow::{Context, Result};
use geo::{BoundingRect, MultiPolygon};
use wkt::TryFromWkt;

/// Parses the task's WKT polygon (spec §6 "polygon (WKT)"). Accepts both a
/// bare `POLYGON` and a `MULTIPOLYGON` — multi-part polygons are handled
/// identically downstream (spec §4.4 "Multi-polygons"): no `unary_union` is
/// applied, so disjoint parts keep disjoint tile sets.
pub fn parse_polygon_wkt(wkt_str: &str) -> Result<MultiPolygon<f64>> {
    if let Ok(mp) = MultiPolygon::<f64>::try_from_wkt_str(wkt_str) {
        return Ok(mp);
    }
    let poly = geo::Polygon::<f64>::try_from_wkt_str(wkt_str)
        .with_context(|| format!("could not parse polygon WKT: {wkt_str}"))?;
    Ok(MultiPolygon::new(vec![poly]))
}

/// True when the polygon *is* its own bounding rectangle (spec §4.4
/// "Fast path"): a single ring, four vertices (plus closing point), with
/// no holes, whose area equals the bounding box area.
pub fn is_rectangle(polygon: &MultiPolygon<f64>) -> bool {
    if polygon.0.len() != 1 {
        return false;
    }
    let poly = &polygon.0[0];
    if poly.interiors().len() != 0 {
        return false;
    }
    let exterior = poly.exterior();
    // closed ring: first == last, so 5 points for a rectangle
    if exterior.0.len() != 5 {
        return false;
    }
    let Some(rect) = polygon.bounding_rect() else { return false };
    let rect_area = (rect.max().x - rect.min().x) * (rect.max().y - rect.min().y);
    use geo::Area;
    (poly.unsigned_area() - rect_area).abs() < 1e-9 * rect_area.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rectangle_is_detected() {
        let wkt = "POLYGON((100 30, 105 30, 105 35, 100 35, 100 30))";
        let poly = parse_polygon_wkt(wkt).unwrap();
        assert!(is_rectangle(&poly));
    }

    #[test]
    fn donut_is_not_a_rectangle() {
        let wkt = "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0), (0.3 0.3, 0.7 0.3, 0.7 0.7, 0.3 0.7, 0.3 0.3))";
        let poly = parse_polygon_wkt(wkt).unwrap();
        assert!(!is_rectangle(&poly));
    }

    #[test]
    fn multipolygon_parses() {
        let wkt = "MULTIPOLYGON(((0 0, 1 0, 1 1, 0 1, 0 0)), ((5 5, 6 5, 6 6, 5 6, 5 5)))";
        let poly = parse_polygon_wkt(wkt).unwrap();
        assert_eq!(poly.0.len(), 2);
        assert!(!is_rectangle(&poly));
    }
}
