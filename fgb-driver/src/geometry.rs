//! Geometry values decoded from FlatGeobuf features.
//!
//! This module provides:
//! - [`GeometryType`], the FlatGeobuf geometry type tag
//! - [`Geometry`], a lightweight owned geometry (points, lines, polygons,
//!   their multi variants and collections)
//! - [`GeometryValue`], a geometry stamped with its spatial reference id,
//!   which is what the driver stores in the geometry slot
//! - [`decode_geometry`], the conversion from the FlatGeobuf geometry table
//!
//! Coordinates keep optional Z and M ordinates when the feature carries them.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use flatbuffers::Vector;

use crate::bounding_box::BoundingBox;
use crate::errors::{FgbError, FgbResult};

/// Geometry type tag as stored in the header and in each geometry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GeometryType {
    /// Mixed geometries; each feature carries its own type.
    #[default]
    Unknown,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
    CircularString,
    CompoundCurve,
    CurvePolygon,
    MultiCurve,
    MultiSurface,
    Curve,
    Surface,
    PolyhedralSurface,
    Tin,
    Triangle,
}

impl GeometryType {
    pub fn from_tag(tag: u8) -> Option<GeometryType> {
        use GeometryType::*;
        let value = match tag {
            0 => Unknown,
            1 => Point,
            2 => LineString,
            3 => Polygon,
            4 => MultiPoint,
            5 => MultiLineString,
            6 => MultiPolygon,
            7 => GeometryCollection,
            8 => CircularString,
            9 => CompoundCurve,
            10 => CurvePolygon,
            11 => MultiCurve,
            12 => MultiSurface,
            13 => Curve,
            14 => Surface,
            15 => PolyhedralSurface,
            16 => Tin,
            17 => Triangle,
            _ => return None,
        };
        Some(value)
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<flatgeobuf::GeometryType> for GeometryType {
    type Error = u8;

    /// Fails with the raw tag when it is not a known type.
    fn try_from(value: flatgeobuf::GeometryType) -> Result<Self, Self::Error> {
        GeometryType::from_tag(value.0).ok_or(value.0)
    }
}

impl From<GeometryType> for flatgeobuf::GeometryType {
    fn from(value: GeometryType) -> Self {
        flatgeobuf::GeometryType(value.tag())
    }
}

/// A coordinate with optional Z and M ordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Coordinate {
    /// Creates a 2D coordinate.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None, m: None }
    }

    /// Creates a coordinate with a Z ordinate.
    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z), m: None }
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.x, self.y)?;
        if let Some(z) = self.z {
            write!(f, " {}", z)?;
        }
        if let Some(m) = self.m {
            write!(f, " {}", m)?;
        }
        Ok(())
    }
}

/// An owned geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Coordinate),
    LineString(Vec<Coordinate>),
    /// Exterior ring first, then holes.
    Polygon(Vec<Vec<Coordinate>>),
    MultiPoint(Vec<Coordinate>),
    MultiLineString(Vec<Vec<Coordinate>>),
    MultiPolygon(Vec<Vec<Vec<Coordinate>>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    /// Creates a 2D point geometry.
    pub fn point(x: f64, y: f64) -> Self {
        Geometry::Point(Coordinate::new(x, y))
    }

    /// Creates a 2D line string from `(x, y)` pairs.
    pub fn line_string(coords: &[(f64, f64)]) -> Self {
        Geometry::LineString(coords.iter().map(|&(x, y)| Coordinate::new(x, y)).collect())
    }

    /// Creates a polygon without holes from `(x, y)` pairs.
    pub fn polygon(exterior: &[(f64, f64)]) -> Self {
        Geometry::Polygon(vec![exterior
            .iter()
            .map(|&(x, y)| Coordinate::new(x, y))
            .collect()])
    }

    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    fn visit_coordinates(&self, visit: &mut impl FnMut(&Coordinate)) {
        match self {
            Geometry::Point(c) => visit(c),
            Geometry::LineString(cs) | Geometry::MultiPoint(cs) => cs.iter().for_each(visit),
            Geometry::Polygon(rings) | Geometry::MultiLineString(rings) => {
                rings.iter().flatten().for_each(visit)
            }
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().flatten().flatten().for_each(visit)
            }
            Geometry::GeometryCollection(parts) => {
                for part in parts {
                    part.visit_coordinates(visit);
                }
            }
        }
    }

    /// Number of coordinates over all parts.
    pub fn num_coordinates(&self) -> usize {
        let mut count = 0;
        self.visit_coordinates(&mut |_| count += 1);
        count
    }

    /// Gets the bounding box of this geometry.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        self.visit_coordinates(&mut |c| bbox.expand_xy(c.x, c.y));
        bbox
    }
}

fn fmt_coords(f: &mut fmt::Formatter<'_>, coords: &[Coordinate]) -> fmt::Result {
    write!(f, "(")?;
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", c)?;
    }
    write!(f, ")")
}

fn fmt_rings(f: &mut fmt::Formatter<'_>, rings: &[Vec<Coordinate>]) -> fmt::Result {
    write!(f, "(")?;
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        fmt_coords(f, ring)?;
    }
    write!(f, ")")
}

impl Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Geometry::Point(c) => write!(f, "POINT ({})", c),
            Geometry::LineString(cs) => {
                write!(f, "LINESTRING ")?;
                fmt_coords(f, cs)
            }
            Geometry::Polygon(rings) => {
                write!(f, "POLYGON ")?;
                fmt_rings(f, rings)
            }
            Geometry::MultiPoint(cs) => {
                write!(f, "MULTIPOINT ")?;
                fmt_coords(f, cs)
            }
            Geometry::MultiLineString(lines) => {
                write!(f, "MULTILINESTRING ")?;
                fmt_rings(f, lines)
            }
            Geometry::MultiPolygon(polygons) => {
                write!(f, "MULTIPOLYGON (")?;
                for (i, polygon) in polygons.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    fmt_rings(f, polygon)?;
                }
                write!(f, ")")
            }
            Geometry::GeometryCollection(parts) => {
                write!(f, "GEOMETRYCOLLECTION (")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A geometry stamped with the spatial reference id of its file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryValue {
    geometry: Geometry,
    srid: i32,
}

impl GeometryValue {
    pub fn new(geometry: Geometry, srid: i32) -> Self {
        Self { geometry, srid }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn srid(&self) -> i32 {
        self.srid
    }

    pub fn into_geometry(self) -> Geometry {
        self.geometry
    }
}

impl Display for GeometryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SRID={};{}", self.srid, self.geometry)
    }
}

/// Flat coordinate arrays of one geometry table.
struct CoordinateArrays<'a> {
    xy: Vector<'a, f64>,
    z: Option<Vector<'a, f64>>,
    m: Option<Vector<'a, f64>>,
}

impl<'a> CoordinateArrays<'a> {
    /// Returns `None` when the table holds no coordinates.
    fn read(geometry: &flatgeobuf::Geometry<'a>) -> FgbResult<Option<Self>> {
        let xy = match geometry.xy() {
            Some(xy) if !xy.is_empty() => xy,
            _ => return Ok(None),
        };
        if xy.len() % 2 != 0 {
            return Err(FgbError::malformed(format!(
                "odd number of xy ordinates ({})",
                xy.len()
            )));
        }
        let count = xy.len() / 2;
        let (z, m) = (geometry.z(), geometry.m());
        for (name, values) in [("z", &z), ("m", &m)] {
            if let Some(values) = values {
                if values.len() != count {
                    return Err(FgbError::malformed(format!(
                        "{} ordinate count {} does not match {} coordinates",
                        name,
                        values.len(),
                        count
                    )));
                }
            }
        }
        Ok(Some(Self { xy, z, m }))
    }

    fn len(&self) -> usize {
        self.xy.len() / 2
    }

    fn coordinate(&self, i: usize) -> Coordinate {
        Coordinate {
            x: self.xy.get(2 * i),
            y: self.xy.get(2 * i + 1),
            z: self.z.as_ref().map(|z| z.get(i)),
            m: self.m.as_ref().map(|m| m.get(i)),
        }
    }

    fn range(&self, start: usize, end: usize) -> Vec<Coordinate> {
        (start..end).map(|i| self.coordinate(i)).collect()
    }

    /// Splits the coordinates at the `ends` offsets; no ends means one part.
    /// The last end must close the coordinate list.
    fn parts(&self, ends: Option<Vector<'a, u32>>) -> FgbResult<Vec<Vec<Coordinate>>> {
        let ends = match ends {
            Some(ends) if !ends.is_empty() => ends,
            _ => return Ok(vec![self.range(0, self.len())]),
        };

        let mut parts = Vec::with_capacity(ends.len());
        let mut start = 0usize;
        for end in ends.iter() {
            let end = end as usize;
            if end < start || end > self.len() {
                return Err(FgbError::malformed(format!(
                    "part end {} outside coordinates {}..{}",
                    end,
                    start,
                    self.len()
                )));
            }
            parts.push(self.range(start, end));
            start = end;
        }
        if start != self.len() {
            return Err(FgbError::malformed(format!(
                "part ends stop at {} of {} coordinates",
                start,
                self.len()
            )));
        }
        Ok(parts)
    }
}

/// Decodes a FlatGeobuf geometry table as `geometry_type`.
///
/// Returns `None` when the table holds no coordinates. Curve and surface
/// types are not supported and make the record undecodable.
pub fn decode_geometry(
    geometry: &flatgeobuf::Geometry<'_>,
    geometry_type: GeometryType,
) -> FgbResult<Option<Geometry>> {
    match geometry_type {
        GeometryType::MultiPolygon => {
            let mut polygons = Vec::new();
            for part in geometry.parts().iter().flat_map(|parts| parts.iter()) {
                if let Some(Geometry::Polygon(rings)) =
                    decode_geometry(&part, GeometryType::Polygon)?
                {
                    polygons.push(rings);
                }
            }
            return Ok((!polygons.is_empty()).then_some(Geometry::MultiPolygon(polygons)));
        }
        GeometryType::GeometryCollection => {
            let mut members = Vec::new();
            for part in geometry.parts().iter().flat_map(|parts| parts.iter()) {
                let part_type = embedded_geometry_type(&part)?;
                if let Some(member) = decode_geometry(&part, part_type)? {
                    members.push(member);
                }
            }
            return Ok((!members.is_empty()).then_some(Geometry::GeometryCollection(members)));
        }
        _ => {}
    }

    let coords = match CoordinateArrays::read(geometry)? {
        Some(coords) => coords,
        None => return Ok(None),
    };
    let geometry = match geometry_type {
        GeometryType::Point => Geometry::Point(coords.coordinate(0)),
        GeometryType::MultiPoint => Geometry::MultiPoint(coords.range(0, coords.len())),
        GeometryType::LineString => Geometry::LineString(coords.range(0, coords.len())),
        GeometryType::MultiLineString => Geometry::MultiLineString(coords.parts(geometry.ends())?),
        GeometryType::Polygon => Geometry::Polygon(coords.parts(geometry.ends())?),
        GeometryType::Unknown => {
            return Err(FgbError::malformed("geometry type is unknown"));
        }
        other => {
            return Err(FgbError::malformed(format!(
                "unsupported geometry type {:?}",
                other
            )));
        }
    };
    Ok(Some(geometry))
}

/// Reads the type tag carried by the geometry table itself.
pub fn embedded_geometry_type(geometry: &flatgeobuf::Geometry<'_>) -> FgbResult<GeometryType> {
    GeometryType::try_from(geometry.type_())
        .map_err(|tag| FgbError::malformed(format!("unknown geometry type tag {}", tag)))
}
