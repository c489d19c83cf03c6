//! Reader for the USDA subset produced by [`crate::writer`].
//!
//! The grammar covered is the layer header, layer metadata, nested `def`
//! prims with optional metadata, and typed attributes whose values are
//! strings, numbers, tokens, tuples or arrays. Anything else is a syntax
//! error; well-formed text with the wrong prim layout is a structure error.

use crate::document::{AssetDocument, MeshPrim, StageMetadata, UpAxis, XformPrim};
use crate::error::DocumentReadError;
use assetgen_data::BoundingBox;
use glam::Vec3;
use std::path::Path;
use tracing::debug;

/// Parse the document stored at `path`.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read(path: impl AsRef<Path>) -> Result<AssetDocument, DocumentReadError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| DocumentReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_usda(&text)
}

/// Parse a document from USDA text.
pub fn from_usda(text: &str) -> Result<AssetDocument, DocumentReadError> {
    let layer = Parser::new(text)?.layer()?;
    let doc = build_document(layer)?;
    doc.validate()?;
    debug!(
        "Parsed document with {} points",
        doc.mesh().points.len()
    );
    Ok(doc)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Punct(char),
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Number(String),
    Ident(String),
    Tuple(Vec<Value>),
    Array(Vec<Value>),
}

#[derive(Debug, Default)]
struct Attribute {
    type_name: String,
    is_array: bool,
    name: String,
    value: Option<Value>,
    metadata: Vec<(String, Value)>,
}

#[derive(Debug, Default)]
struct Prim {
    kind: String,
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<Prim>,
}

#[derive(Debug, Default)]
struct Layer {
    metadata: Vec<(String, Value)>,
    prims: Vec<Prim>,
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, DocumentReadError> {
    let syntax = |line, message: String| DocumentReadError::Syntax { line, message };

    let mut lines = text.lines();
    match lines.next().map(str::trim_end) {
        Some(header) if header.starts_with("#usda 1.0") => {}
        _ => return Err(syntax(1, "missing `#usda 1.0` header".to_string())),
    }

    let mut tokens = Vec::new();
    for (offset, line) in lines.enumerate() {
        let line_no = offset + 2;
        let mut chars = line.char_indices().peekable();
        while let Some(&(start, c)) = chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    chars.next();
                }
                '#' => break,
                '(' | ')' | '[' | ']' | '{' | '}' | '=' | ',' => {
                    tokens.push((Token::Punct(c), line_no));
                    chars.next();
                }
                '"' => {
                    chars.next();
                    let mut s = String::new();
                    let mut closed = false;
                    for (_, ch) in chars.by_ref() {
                        if ch == '"' {
                            closed = true;
                            break;
                        }
                        s.push(ch);
                    }
                    if !closed {
                        return Err(syntax(line_no, "unterminated string".to_string()));
                    }
                    tokens.push((Token::Str(s), line_no));
                }
                c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                    let mut end = start;
                    while let Some(&(i, ch)) = chars.peek() {
                        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '+' | '.') {
                            end = i + ch.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    tokens.push((Token::Number(line[start..end].to_string()), line_no));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut end = start;
                    while let Some(&(i, ch)) = chars.peek() {
                        if ch.is_alphanumeric() || matches!(ch, '_' | ':' | '.') {
                            end = i + ch.len_utf8();
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    tokens.push((Token::Ident(line[start..end].to_string()), line_no));
                }
                other => {
                    return Err(syntax(line_no, format!("unexpected character `{other}`")));
                }
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self, DocumentReadError> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map_or(1, |(_, line)| *line)
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, DocumentReadError> {
        Err(DocumentReadError::Syntax {
            line: self.line(),
            message: message.into(),
        })
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn expect_punct(&mut self, c: char) -> Result<(), DocumentReadError> {
        if self.at_punct(c) {
            self.pos += 1;
            Ok(())
        } else {
            self.error(format!("expected `{c}`"))
        }
    }

    fn ident(&mut self) -> Result<String, DocumentReadError> {
        match self.peek() {
            Some(Token::Ident(_)) => match self.next() {
                Some(Token::Ident(s)) => Ok(s),
                _ => self.error("expected identifier"),
            },
            _ => self.error("expected identifier"),
        }
    }

    fn string(&mut self) -> Result<String, DocumentReadError> {
        match self.peek() {
            Some(Token::Str(_)) => match self.next() {
                Some(Token::Str(s)) => Ok(s),
                _ => self.error("expected string"),
            },
            _ => self.error("expected string"),
        }
    }

    fn layer(&mut self) -> Result<Layer, DocumentReadError> {
        let mut layer = Layer::default();
        if self.at_punct('(') {
            layer.metadata = self.metadata_block()?;
        }
        while self.peek().is_some() {
            layer.prims.push(self.prim()?);
        }
        Ok(layer)
    }

    /// `( name = value ... )`
    fn metadata_block(&mut self) -> Result<Vec<(String, Value)>, DocumentReadError> {
        self.expect_punct('(')?;
        let mut entries = Vec::new();
        while !self.at_punct(')') {
            let key = self.ident()?;
            self.expect_punct('=')?;
            entries.push((key, self.value()?));
        }
        self.expect_punct(')')?;
        Ok(entries)
    }

    fn prim(&mut self) -> Result<Prim, DocumentReadError> {
        if self.ident()? != "def" {
            return self.error("expected `def`");
        }
        let kind = self.ident()?;
        let name = self.string()?;
        if self.at_punct('(') {
            self.metadata_block()?;
        }
        self.expect_punct('{')?;

        let mut prim = Prim {
            kind,
            name,
            ..Prim::default()
        };
        while !self.at_punct('}') {
            match self.peek() {
                None => return self.error("unterminated prim"),
                Some(Token::Ident(word)) if word == "def" => prim.children.push(self.prim()?),
                Some(_) => prim.attributes.push(self.attribute()?),
            }
        }
        self.expect_punct('}')?;
        Ok(prim)
    }

    /// `[uniform] type[[]] name [= value] [( metadata )]`
    fn attribute(&mut self) -> Result<Attribute, DocumentReadError> {
        let mut type_name = self.ident()?;
        if type_name == "uniform" {
            type_name = self.ident()?;
        }
        let is_array = if self.at_punct('[') {
            self.expect_punct('[')?;
            self.expect_punct(']')?;
            true
        } else {
            false
        };
        let name = self.ident()?;
        let mut attribute = Attribute {
            type_name,
            is_array,
            name,
            ..Attribute::default()
        };
        if self.at_punct('=') {
            self.expect_punct('=')?;
            attribute.value = Some(self.value()?);
        }
        if self.at_punct('(') {
            attribute.metadata = self.metadata_block()?;
        }
        Ok(attribute)
    }

    fn value(&mut self) -> Result<Value, DocumentReadError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::Number(n)) => Ok(Value::Number(n)),
            Some(Token::Ident(s)) => Ok(Value::Ident(s)),
            Some(Token::Punct('(')) => Ok(Value::Tuple(self.sequence(')')?)),
            Some(Token::Punct('[')) => Ok(Value::Array(self.sequence(']')?)),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                self.error("expected a value")
            }
        }
    }

    /// Comma-separated values up to `close`; the opener is already consumed.
    fn sequence(&mut self, close: char) -> Result<Vec<Value>, DocumentReadError> {
        let mut items = Vec::new();
        if self.at_punct(close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.value()?);
            if self.at_punct(',') {
                self.pos += 1;
                // Trailing comma.
                if self.at_punct(close) {
                    self.pos += 1;
                    return Ok(items);
                }
            } else {
                self.expect_punct(close)?;
                return Ok(items);
            }
        }
    }
}

fn structure(message: impl Into<String>) -> DocumentReadError {
    DocumentReadError::Structure(message.into())
}

fn build_document(layer: Layer) -> Result<AssetDocument, DocumentReadError> {
    let lookup = |key: &str| layer.metadata.iter().find(|(k, _)| k == key).map(|(_, v)| v);

    let default_prim = match lookup("defaultPrim") {
        Some(Value::Str(name)) => name.clone(),
        Some(_) => return Err(structure("defaultPrim must be a string")),
        None => return Err(structure("layer has no defaultPrim")),
    };
    // Stage fallbacks when the metadata is absent: Y up, centimeters.
    let up_axis = match lookup("upAxis") {
        Some(Value::Str(token)) => UpAxis::from_token(token)
            .ok_or_else(|| structure(format!("unsupported upAxis `{token}`")))?,
        Some(_) => return Err(structure("upAxis must be a string")),
        None => UpAxis::Y,
    };
    let meters_per_unit = match lookup("metersPerUnit") {
        Some(value) => number::<f64>(value, "metersPerUnit")?,
        None => 0.01,
    };

    let mut prims = layer.prims;
    let index = prims
        .iter()
        .position(|p| p.name == default_prim)
        .ok_or_else(|| structure(format!("defaultPrim `{default_prim}` is not defined")))?;
    let root = prims.swap_remove(index);
    if root.kind != "Xform" {
        return Err(structure(format!(
            "root prim `{}` is a {}, expected Xform",
            root.name, root.kind
        )));
    }
    let mut meshes: Vec<Prim> = root
        .children
        .into_iter()
        .filter(|p| p.kind == "Mesh")
        .collect();
    if meshes.len() != 1 {
        return Err(structure(format!(
            "root prim must own exactly one Mesh, found {}",
            meshes.len()
        )));
    }
    let mesh = build_mesh(meshes.remove(0))?;

    Ok(AssetDocument {
        metadata: StageMetadata {
            up_axis,
            meters_per_unit,
        },
        root: XformPrim {
            name: root.name,
            mesh,
        },
    })
}

fn build_mesh(prim: Prim) -> Result<MeshPrim, DocumentReadError> {
    let find = |name: &str| prim.attributes.iter().find(|a| a.name == name);
    let required = |name: &str| {
        find(name)
            .filter(|a| a.is_array)
            .and_then(|a| a.value.as_ref())
            .ok_or_else(|| structure(format!("mesh is missing array attribute `{name}`")))
    };
    let vertex_interpolated = |name: &str| -> Result<Option<Vec<Vec3>>, DocumentReadError> {
        let Some(attribute) = find(name) else {
            return Ok(None);
        };
        let interpolation = attribute
            .metadata
            .iter()
            .find(|(k, _)| k == "interpolation")
            .map(|(_, v)| v);
        if interpolation != Some(&Value::Str("vertex".to_string())) {
            return Err(structure(format!("`{name}` must use vertex interpolation")));
        }
        match &attribute.value {
            Some(value) => vec3_array(value, name).map(Some),
            None => Ok(None),
        }
    };

    let points = vec3_array(required("points")?, "points")?;
    let face_vertex_counts = int_array(required("faceVertexCounts")?, "faceVertexCounts")?;
    let face_vertex_indices = int_array(required("faceVertexIndices")?, "faceVertexIndices")?;
    let extent = vec3_array(required("extent")?, "extent")?;
    let extent = match extent.as_slice() {
        [min, max] => BoundingBox::from_corners(*min, *max)
            .ok_or_else(|| structure("extent min exceeds max"))?,
        _ => return Err(structure("extent must hold exactly two corners")),
    };
    if let Some(attribute) = find("points").filter(|a| a.type_name != "point3f") {
        return Err(structure(format!(
            "points has type {}, expected point3f",
            attribute.type_name
        )));
    }

    Ok(MeshPrim {
        name: prim.name.clone(),
        points,
        face_vertex_counts,
        face_vertex_indices,
        normals: vertex_interpolated("normals")?,
        display_color: vertex_interpolated("primvars:displayColor")?,
        extent,
    })
}

fn number<T: std::str::FromStr>(value: &Value, what: &str) -> Result<T, DocumentReadError> {
    match value {
        Value::Number(text) => text
            .parse()
            .map_err(|_| structure(format!("`{text}` in {what} is not a valid number"))),
        _ => Err(structure(format!("{what} must be numeric"))),
    }
}

fn int_array(value: &Value, what: &str) -> Result<Vec<i32>, DocumentReadError> {
    match value {
        Value::Array(items) => items.iter().map(|v| number::<i32>(v, what)).collect(),
        _ => Err(structure(format!("{what} must be an array"))),
    }
}

fn vec3_array(value: &Value, what: &str) -> Result<Vec<Vec3>, DocumentReadError> {
    let Value::Array(items) = value else {
        return Err(structure(format!("{what} must be an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Tuple(parts) if parts.len() == 3 => Ok(Vec3::new(
                number(&parts[0], what)?,
                number(&parts[1], what)?,
                number(&parts[2], what)?,
            )),
            _ => Err(structure(format!("{what} entries must be 3-tuples"))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{to_usda, write};
    use assetgen_data::Mesh;

    fn sample_doc(meters_per_unit: f64) -> AssetDocument {
        let mut mesh = Mesh::new(
            vec![
                Vec3::new(0.1, -0.2, 0.3),
                Vec3::new(1.0 / 3.0, 2.5e-7, -4.0),
                Vec3::new(123456.79, 0.0, 1.0),
                Vec3::new(-0.0, 7.0, 0.5),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        mesh.normals = Some(vec![Vec3::Z, Vec3::X, Vec3::Y, Vec3::new(0.6, 0.8, 0.0)]);
        mesh.colors = Some(vec![Vec3::new(0.25, 0.5, 1.0); 4]);
        let bounds = mesh.bounds().unwrap();
        AssetDocument::from_mesh(mesh, bounds, StageMetadata::with_meters_per_unit(meters_per_unit))
            .unwrap()
    }

    #[test]
    fn test_text_round_trip_is_exact() {
        let doc = sample_doc(1.0);
        let parsed = from_usda(&to_usda(&doc)).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_file_round_trip_keeps_units_and_coordinates() {
        let path = std::env::temp_dir().join(format!(
            "assetgen-usd-{}-roundtrip.usda",
            std::process::id()
        ));
        let doc = sample_doc(0.001);
        write(doc.clone(), &path).unwrap();
        let parsed = read(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(parsed.metadata.meters_per_unit, 0.001);
        assert_eq!(parsed.metadata.up_axis, UpAxis::Z);
        assert_eq!(parsed.mesh().points, doc.mesh().points);
        assert_eq!(parsed.to_mesh().faces, vec![[0, 1, 2], [0, 2, 3]]);
        assert_eq!(parsed.mesh().extent, doc.mesh().extent);
    }

    #[test]
    fn test_missing_header_is_syntax_error() {
        let err = from_usda("def Xform \"Asset\" {}").unwrap_err();
        assert!(matches!(err, DocumentReadError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_unterminated_prim_reports_line() {
        let text = "#usda 1.0\n(\n    defaultPrim = \"Asset\"\n)\ndef Xform \"Asset\"\n{\n";
        assert!(matches!(
            from_usda(text),
            Err(DocumentReadError::Syntax { .. })
        ));
    }

    #[test]
    fn test_missing_default_prim() {
        let text = "#usda 1.0\ndef Xform \"Asset\"\n{\n}\n";
        assert!(matches!(
            from_usda(text),
            Err(DocumentReadError::Structure(_))
        ));
    }

    #[test]
    fn test_root_without_mesh_is_structure_error() {
        let text = "#usda 1.0\n(\n    defaultPrim = \"Asset\"\n)\n\ndef Xform \"Asset\"\n{\n}\n";
        let err = from_usda(text).unwrap_err();
        assert!(err.to_string().contains("exactly one Mesh"));
    }

    #[test]
    fn test_normals_need_vertex_interpolation() {
        let text = to_usda(&sample_doc(1.0)).replacen(
            "interpolation = \"vertex\"",
            "interpolation = \"faceVarying\"",
            1,
        );
        assert!(matches!(
            from_usda(&text),
            Err(DocumentReadError::Structure(_))
        ));
    }

    #[test]
    fn test_invariants_are_checked_after_parsing() {
        let text = to_usda(&sample_doc(1.0)).replace(
            "int[] faceVertexIndices = [0, 1, 2, 0, 2, 3]",
            "int[] faceVertexIndices = [0, 1, 2, 0, 2, 9]",
        );
        assert!(matches!(
            from_usda(&text),
            Err(DocumentReadError::Invariant(_))
        ));
    }

    #[test]
    fn test_comments_and_trailing_commas() {
        let text = "#usda 1.0\n(\n    defaultPrim = \"Asset\" # main entry\n    upAxis = \"Z\"\n    metersPerUnit = 1\n)\n\
                    def Xform \"Asset\"\n{\n    def Mesh \"Mesh\" (\n        kind = \"component\"\n    )\n    {\n\
                    float3[] extent = [(0, 0, 0), (1, 1, 0),]\n\
                    int[] faceVertexCounts = [3]\n\
                    int[] faceVertexIndices = [0, 1, 2]\n\
                    uniform token subdivisionScheme = \"none\"\n\
                    point3f[] points = [(0, 0, 0), (1, 0, 0), (0, 1, 0)]\n    }\n}\n";
        let doc = from_usda(text).unwrap();
        assert_eq!(doc.mesh().points.len(), 3);
        assert!(doc.mesh().normals.is_none());
    }
}
