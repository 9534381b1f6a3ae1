//! Edge terminals.
//!
//! Callers may describe an edge end in four ways: a bare cell id, an explicit
//! point, an `[x, y]` pair, or a full cell terminal (cell + port + anchor).
//! [`Terminal`] is that input union. It is normalized exactly once, into the
//! canonical [`TerminalData`], when it enters an [`EdgeProps`](super::EdgeProps);
//! nothing downstream ever looks at the input shape again.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{CellId, Point};

/// A terminal attached to a cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellTerminal {
    pub cell: CellId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_point: Option<Value>,
}

impl CellTerminal {
    pub fn new(cell: impl Into<CellId>) -> Self {
        Self {
            cell: cell.into(),
            port: None,
            anchor: None,
            connection_point: None,
        }
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }
}

/// Terminal as accepted from callers.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Terminal {
    /// Bare cell id (or a reference to a live cell).
    Id(CellId),
    /// `[x, y]`
    Pair([f64; 2]),
    /// `{ x, y }`
    Point(Point),
    /// Fully-qualified cell terminal.
    Cell(CellTerminal),
}

/// Canonical terminal, the only shape the engine ever receives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged, from = "Terminal")]
pub enum TerminalData {
    Cell(CellTerminal),
    Point(Point),
}

impl TerminalData {
    /// Cell this terminal is attached to, if any.
    pub fn cell(&self) -> Option<&CellId> {
        match self {
            TerminalData::Cell(terminal) => Some(&terminal.cell),
            TerminalData::Point(_) => None,
        }
    }

    pub fn point(&self) -> Option<Point> {
        match self {
            TerminalData::Point(point) => Some(*point),
            TerminalData::Cell(_) => None,
        }
    }
}

impl From<Terminal> for TerminalData {
    fn from(terminal: Terminal) -> Self {
        match terminal {
            Terminal::Id(cell) => TerminalData::Cell(CellTerminal::new(cell)),
            Terminal::Pair([x, y]) => TerminalData::Point(Point::new(x, y)),
            Terminal::Point(point) => TerminalData::Point(point),
            Terminal::Cell(terminal) => TerminalData::Cell(terminal),
        }
    }
}

impl From<&str> for Terminal {
    fn from(id: &str) -> Self {
        Terminal::Id(id.into())
    }
}

impl From<String> for Terminal {
    fn from(id: String) -> Self {
        Terminal::Id(id.into())
    }
}

impl From<CellId> for Terminal {
    fn from(id: CellId) -> Self {
        Terminal::Id(id)
    }
}

impl From<&CellId> for Terminal {
    fn from(id: &CellId) -> Self {
        Terminal::Id(id.clone())
    }
}

impl From<[f64; 2]> for Terminal {
    fn from(pair: [f64; 2]) -> Self {
        Terminal::Pair(pair)
    }
}

impl From<(f64, f64)> for Terminal {
    fn from((x, y): (f64, f64)) -> Self {
        Terminal::Point(Point::new(x, y))
    }
}

impl From<Point> for Terminal {
    fn from(point: Point) -> Self {
        Terminal::Point(point)
    }
}

impl From<CellTerminal> for Terminal {
    fn from(terminal: CellTerminal) -> Self {
        Terminal::Cell(terminal)
    }
}

impl From<TerminalData> for Terminal {
    fn from(data: TerminalData) -> Self {
        match data {
            TerminalData::Cell(terminal) => Terminal::Cell(terminal),
            TerminalData::Point(point) => Terminal::Point(point),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(terminal: impl Into<Terminal>) -> TerminalData {
        TerminalData::from(terminal.into())
    }

    #[test]
    fn test_four_input_shapes_normalize() {
        assert_eq!(normalize("n1"), TerminalData::Cell(CellTerminal::new("n1")));
        assert_eq!(normalize([3.0, 4.0]), TerminalData::Point(Point::new(3.0, 4.0)));
        assert_eq!(normalize((3.0, 4.0)), TerminalData::Point(Point::new(3.0, 4.0)));
        assert_eq!(
            normalize(CellTerminal::new("n1").port("out")),
            TerminalData::Cell(CellTerminal::new("n1").port("out"))
        );
    }

    #[test]
    fn test_json_shapes_deserialize_to_canonical() {
        let from_id: TerminalData = serde_json::from_str("\"n1\"").unwrap();
        assert_eq!(from_id.cell(), Some(&CellId::from("n1")));

        let from_pair: TerminalData = serde_json::from_str("[1.5, 2]").unwrap();
        assert_eq!(from_pair.point(), Some(Point::new(1.5, 2.0)));

        let from_point: TerminalData = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        assert_eq!(from_point.point(), Some(Point::new(1.0, 2.0)));

        let from_cell: TerminalData =
            serde_json::from_str(r#"{"cell": "n2", "port": "in"}"#).unwrap();
        assert_eq!(from_cell, TerminalData::Cell(CellTerminal::new("n2").port("in")));
    }

    #[test]
    fn test_canonical_serializes_without_empty_fields() {
        let data = TerminalData::Cell(CellTerminal::new("n1"));
        assert_eq!(serde_json::to_value(&data).unwrap(), serde_json::json!({ "cell": "n1" }));
    }
}
