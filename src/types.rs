use std::io::Read;

use crate::error::{Error, Result};

/// Longest byte length a `Text` value may occupy on disk. The length
/// prefix is a single unsigned byte.
pub const MAX_TEXT_LEN: usize = 255;

/// One decoded cell of a row.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub enum Value {
    UInt32(u32),
    Text(String),
}

/// A row is a positional sequence of cells, one per schema column.
pub type Row = Vec<Value>;

/// A column type: the codec bundle for one kind of cell.
///
/// All three operations are pure. `marshall` and `unmarshall` translate
/// between cells and their on-disk encoding; `from_str` parses a textual
/// literal as it would arrive from a parsed statement.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ColumnType {
    /// 4 bytes, little-endian unsigned.
    UInt32,
    /// 1-byte unsigned length, then that many UTF-8 bytes.
    Text,
}

impl ColumnType {
    /// Append the on-disk encoding of `value` to `buf`.
    pub fn marshall(self, value: &Value, buf: &mut Vec<u8>) -> Result<()> {
        match (self, value) {
            (ColumnType::UInt32, Value::UInt32(n)) => {
                buf.extend_from_slice(&n.to_le_bytes());
                Ok(())
            }
            (ColumnType::Text, Value::Text(s)) => {
                if s.len() > MAX_TEXT_LEN {
                    return Err(Error::Codec(format!(
                        "text value is {} bytes, max is {}",
                        s.len(),
                        MAX_TEXT_LEN
                    )));
                }
                buf.push(s.len() as u8);
                buf.extend_from_slice(s.as_bytes());
                Ok(())
            }
            (dtype, value) => Err(Error::Codec(format!(
                "cannot encode {:?} as {:?}",
                value, dtype
            ))),
        }
    }

    /// Consume exactly one value's bytes from a positional cursor.
    pub fn unmarshall<R: Read>(self, mut r: R) -> Result<Value> {
        match self {
            ColumnType::UInt32 => {
                let mut data = [0; 4];
                r.read_exact(&mut data).map_err(truncated)?;
                Ok(Value::UInt32(u32::from_le_bytes(data)))
            }
            ColumnType::Text => {
                let mut len = [0; 1];
                r.read_exact(&mut len).map_err(truncated)?;
                let mut data = vec![0; len[0] as usize];
                r.read_exact(&mut data).map_err(truncated)?;
                let s = String::from_utf8(data)
                    .map_err(|e| Error::Codec(format!("text value is not utf-8: {}", e)))?;
                Ok(Value::Text(s))
            }
        }
    }

    /// Parse a textual literal into a cell of this type.
    pub fn from_str(self, value: &str) -> Result<Value> {
        match self {
            ColumnType::UInt32 => {
                let n = value
                    .parse::<u32>()
                    .map_err(|e| Error::Codec(format!("bad uint32 literal {:?}: {}", value, e)))?;
                Ok(Value::UInt32(n))
            }
            ColumnType::Text => Ok(Value::Text(value.to_owned())),
        }
    }
}

fn truncated(e: std::io::Error) -> Error {
    Error::Codec(format!("record truncated: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip() -> anyhow::Result<()> {
        let cases = vec![
            (ColumnType::UInt32, Value::UInt32(0)),
            (ColumnType::UInt32, Value::UInt32(514)),
            (ColumnType::UInt32, Value::UInt32(u32::max_value())),
            (ColumnType::Text, Value::Text(String::new())),
            (ColumnType::Text, Value::Text(String::from("J. Cliff Dyer"))),
            (ColumnType::Text, Value::Text(String::from("naïve café"))),
        ];
        for (dtype, value) in cases {
            let mut buf = Vec::new();
            dtype.marshall(&value, &mut buf)?;
            let decoded = dtype.unmarshall(Cursor::new(buf))?;
            assert_eq!(decoded, value);
        }
        Ok(())
    }

    #[test]
    fn marshalled_bytes() -> anyhow::Result<()> {
        let mut buf = Vec::new();
        ColumnType::UInt32.marshall(&Value::UInt32(514), &mut buf)?;
        ColumnType::Text.marshall(&Value::Text(String::from("abc")), &mut buf)?;
        assert_eq!(buf, vec![2, 2, 0, 0, 3, b'a', b'b', b'c']);
        Ok(())
    }

    #[test]
    fn text_too_long() {
        let mut buf = Vec::new();
        let long = "x".repeat(MAX_TEXT_LEN + 1);
        ColumnType::Text
            .marshall(&Value::Text(long), &mut buf)
            .expect_err("256-byte text should not encode");
        assert!(buf.is_empty());

        let max = "x".repeat(MAX_TEXT_LEN);
        ColumnType::Text
            .marshall(&Value::Text(max), &mut buf)
            .expect("255-byte text should encode");
    }

    #[test]
    fn wrong_variant() {
        let mut buf = Vec::new();
        ColumnType::UInt32
            .marshall(&Value::Text(String::from("514")), &mut buf)
            .expect_err("text cell should not encode as uint32");
    }

    #[test]
    fn unmarshall_short_read() {
        ColumnType::UInt32
            .unmarshall(Cursor::new(vec![1, 2]))
            .expect_err("two bytes is not a uint32");
        // length prefix promises 5 bytes, only 2 present
        ColumnType::Text
            .unmarshall(Cursor::new(vec![5, b'a', b'b']))
            .expect_err("truncated text should not decode");
    }

    #[test]
    fn unmarshall_bad_utf8() {
        ColumnType::Text
            .unmarshall(Cursor::new(vec![2, 0xff, 0xfe]))
            .expect_err("invalid utf-8 should not decode");
    }

    #[test]
    fn from_str_parsing() -> anyhow::Result<()> {
        assert_eq!(ColumnType::UInt32.from_str("97757")?, Value::UInt32(97757));
        assert_eq!(
            ColumnType::Text.from_str("10 to Midnight (1983)")?,
            Value::Text(String::from("10 to Midnight (1983)"))
        );
        ColumnType::UInt32
            .from_str("abc")
            .expect_err("junk should not parse");
        ColumnType::UInt32
            .from_str("4294967296")
            .expect_err("2^32 overflows a uint32");
        ColumnType::UInt32
            .from_str("-1")
            .expect_err("negative values should not parse");
        Ok(())
    }

    #[test]
    fn value_ordering() {
        assert!(Value::UInt32(2) < Value::UInt32(10));
        assert!(Value::Text(String::from("10 to")) < Value::Text(String::from("10,000")));
        assert!(Value::Text(String::from("!0")) < Value::Text(String::from("'Hellboy'")));
    }

    #[test]
    fn random_roundtrip() -> anyhow::Result<()> {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let mut buf = Vec::new();
            ColumnType::UInt32.marshall(&Value::UInt32(rng.gen()), &mut buf)?;
            let len = rng.gen_range(0, MAX_TEXT_LEN + 1);
            let text: String = (0..len).map(|_| rng.sample(Alphanumeric)).collect();
            ColumnType::Text.marshall(&Value::Text(text.clone()), &mut buf)?;

            let mut cursor = Cursor::new(buf);
            let n = ColumnType::UInt32.unmarshall(&mut cursor)?;
            let t = ColumnType::Text.unmarshall(&mut cursor)?;
            assert!(matches!(n, Value::UInt32(_)));
            assert_eq!(t, Value::Text(text));
        }
        Ok(())
    }
}
