use cgmath::{Quaternion, Vector3};
use nom::bytes::complete::take;
use nom::combinator::{map, peek};
use nom::error::{ErrorKind, ParseError};
use nom::number::complete::{le_f32, le_i32, le_u32};
use nom::sequence::tuple;

use super::IResult;
use crate::error::FormatError;
use crate::Tag;

impl<'a> ParseError<&'a [u8]> for FormatError {
    fn from_error_kind(_input: &'a [u8], kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Eof => FormatError::UnexpectedEof,
            kind => FormatError::Malformed(format!("{:?}", kind)),
        }
    }

    fn append(_input: &'a [u8], _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

/// MDL text. Only an unterminated string can fail to tokenize, and it runs
/// off the end of the input.
impl<'a> ParseError<&'a str> for FormatError {
    fn from_error_kind(_input: &'a str, kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Eof | ErrorKind::TakeUntil => FormatError::UnexpectedEof,
            kind => FormatError::Malformed(format!("{:?}", kind)),
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

pub(crate) fn into_format(err: nom::Err<FormatError>) -> FormatError {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => FormatError::UnexpectedEof,
    }
}

/// Stops the whole decode; no alternative branch will be tried.
pub(crate) fn failure(err: FormatError) -> nom::Err<FormatError> {
    nom::Err::Failure(err)
}

pub(crate) fn finish<T>(res: IResult<'_, T>) -> Result<T, FormatError> {
    match res {
        Ok((_, v)) => Ok(v),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(e),
        Err(nom::Err::Incomplete(_)) => Err(FormatError::UnexpectedEof),
    }
}

/// Like [`finish`] but also rejects trailing bytes.
pub(crate) fn finish_exact<T>(res: IResult<'_, T>, block: &str) -> Result<T, FormatError> {
    match res {
        Ok((rest, _)) if !rest.is_empty() => Err(FormatError::Malformed(format!(
            "{} trailing bytes after {}",
            rest.len(),
            block
        ))),
        res => finish(res),
    }
}

pub(crate) fn usize(i: &[u8]) -> IResult<'_, usize> {
    map(le_u32, |n| n as usize)(i)
}

/// An `i32` id where any negative value means "none".
pub(crate) fn optional_id(i: &[u8]) -> IResult<'_, Option<u32>> {
    map(le_i32, |n| if n < 0 { None } else { Some(n as u32) })(i)
}

pub(crate) fn any_tag(i: &[u8]) -> IResult<'_, Tag> {
    map(take(4usize), |b: &[u8]| Tag([b[0], b[1], b[2], b[3]]))(i)
}

pub(crate) fn peek_tag(i: &[u8]) -> IResult<'_, Tag> {
    peek(any_tag)(i)
}

/// Reads the next tag only if it is `expected`. Absent optional blocks are
/// `None`; truncated input is not.
pub(crate) fn opt_tag(expected: Tag) -> impl Fn(&[u8]) -> IResult<'_, Option<Tag>> {
    move |i: &[u8]| {
        if i.len() < 4 {
            return Ok((i, None));
        }
        let (_, found) = peek_tag(i)?;
        if found == expected {
            map(any_tag, Some)(i)
        } else {
            Ok((i, None))
        }
    }
}

pub(crate) fn read_tag(expected: Tag) -> impl Fn(&[u8]) -> IResult<'_, Tag> {
    move |i: &[u8]| {
        let (i, found) = any_tag(i)?;
        if found == expected {
            Ok((i, found))
        } else {
            Err(failure(FormatError::TagMismatch { expected, found }))
        }
    }
}

/// Null padded string of a fixed byte width.
pub(crate) fn fixed_string(len: usize) -> impl Fn(&[u8]) -> IResult<'_, String> {
    move |i: &[u8]| {
        map(take(len), |b: &[u8]| {
            let end = b.iter().position(|c| *c == 0).unwrap_or(b.len());
            String::from_utf8_lossy(&b[..end]).into_owned()
        })(i)
    }
}

pub(crate) fn vector3(i: &[u8]) -> IResult<'_, Vector3<f32>> {
    map(tuple((le_f32, le_f32, le_f32)), |(x, y, z)| {
        Vector3::new(x, y, z)
    })(i)
}

/// Stored x, y, z, w.
pub(crate) fn quaternion(i: &[u8]) -> IResult<'_, Quaternion<f32>> {
    map(tuple((le_f32, le_f32, le_f32, le_f32)), |(x, y, z, w)| {
        Quaternion::new(w, x, y, z)
    })(i)
}

/// Splits off an object whose leading `u32` counts its own bytes, itself
/// included. Returns the body after the size field.
pub(crate) fn sized(i: &[u8]) -> IResult<'_, &[u8]> {
    let (i, size) = usize(i)?;
    if size < 4 {
        return Err(failure(FormatError::Malformed(format!(
            "object size {} is smaller than its size field",
            size
        ))));
    }
    take(size - 4)(i)
}

/// A top-level chunk: tag, byte count of the payload, payload.
pub(crate) fn chunk(i: &[u8]) -> IResult<'_, (Tag, &[u8])> {
    let (i, tag) = any_tag(i)?;
    let (i, size) = usize(i)?;
    let (i, data) = take(size)(i)?;
    Ok((i, (tag, data)))
}

/// Applies `f` until the input runs out.
pub(crate) fn many_to_end<'a, O, F>(f: F) -> impl Fn(&'a [u8]) -> IResult<'a, Vec<O>>
where
    F: Fn(&'a [u8]) -> IResult<'a, O>,
{
    move |mut i: &'a [u8]| {
        let mut res = Vec::new();
        while !i.is_empty() {
            let (i1, val) = f(i)?;
            if i1.len() == i.len() {
                return Err(failure(FormatError::Malformed(
                    "parser made no progress".into(),
                )));
            }
            i = i1;
            res.push(val);
        }
        Ok((i, res))
    }
}

/// Rejects element counts the remaining input cannot possibly hold, before
/// anything is allocated for them.
pub(crate) fn check_count(
    i: &[u8],
    count: usize,
    min_size: usize,
) -> Result<(), nom::Err<FormatError>> {
    match count.checked_mul(min_size) {
        Some(needed) if needed <= i.len() => Ok(()),
        _ => Err(failure(FormatError::UnexpectedEof)),
    }
}
