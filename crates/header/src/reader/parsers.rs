//! Library of parser functions for text headers

// nom parser combinators
use nom::bytes::complete::{is_a, tag, take_till1};
use nom::character::complete::{char, digit1, i64 as integer, space0};
use nom::combinator::{opt, rest};
use nom::multi::separated_list1;
use nom::number::complete::double;
use nom::sequence::{preceded, terminated, tuple};
use nom::IResult;

/// Check for the `NRRD000X` magic line
pub fn is_nrrd_magic(i: &str) -> bool {
    nrrd_magic(i).is_ok()
}

/// Parse the `NRRD000X` magic, returning the format version digits
pub fn nrrd_magic(i: &str) -> IResult<&str, &str> {
    preceded(tag("NRRD"), digit1)(i)
}

/// Parse a `key: value` field or `key:=value` key/value pair
///
/// The key is trimmed and lowercased by the caller. The value is everything
/// after the separator with leading whitespace removed.
pub fn field(i: &str) -> IResult<&str, (&str, &str)> {
    let (i, key) = take_till1(|c| c == ':')(i)?;
    let (i, _) = tuple((char(':'), opt(char('=')), space0))(i)?;
    let (i, value) = rest(i)?;
    Ok((i, (key.trim(), value.trim_end())))
}

/// Any run of spaces, commas, and vector parentheses
fn separator(i: &str) -> IResult<&str, &str> {
    is_a(" \t,()")(i)
}

/// List of floats in any mix of plain and `(x,y,z)` vector notation
///
/// Parsing stops at the first token that is not a number, such as `none`.
pub fn float_list(i: &str) -> IResult<&str, Vec<f64>> {
    preceded(opt(separator), separated_list1(separator, double))(i)
}

/// List of integers separated by whitespace or commas
pub fn integer_list(i: &str) -> IResult<&str, Vec<i64>> {
    preceded(opt(separator), separated_list1(separator, integer))(i)
}

/// Three component vector written as `(x,y,z)`
pub fn vector3(i: &str) -> IResult<&str, [f64; 3]> {
    let (i, _) = terminated(char('('), space0)(i)?;
    let (i, x) = terminated(double, tuple((space0, char(','), space0)))(i)?;
    let (i, y) = terminated(double, tuple((space0, char(','), space0)))(i)?;
    let (i, z) = terminated(double, tuple((space0, char(')'))))(i)?;
    Ok((i, [x, y, z]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_magic() {
        assert!(is_nrrd_magic("NRRD0004"));
        assert!(!is_nrrd_magic("NIFTI"));
    }

    #[test]
    fn parse_field() {
        assert_eq!(field("type: unsigned char"), Ok(("", ("type", "unsigned char"))));
        assert_eq!(field("space units:=\"mm\""), Ok(("", ("space units", "\"mm\""))));
        assert!(field(": nothing").is_err());
    }

    #[test]
    fn parse_vectors() {
        let (_, v) = float_list("(1,0,0) (0, 2.5,0) (0,0,-3)").unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0, 2.5, 0.0, 0.0, 0.0, -3.0]);

        let (_, v) = float_list("none (1,0,0) (0,1,0) (0,0,1)").unwrap_or_default();
        assert!(v.is_empty());

        assert_eq!(vector3("(1.5, -2,3e1)"), Ok(("", [1.5, -2.0, 30.0])));
    }

    #[test]
    fn parse_sizes() {
        assert_eq!(integer_list("64 64 30"), Ok(("", vec![64, 64, 30])));
    }
}
