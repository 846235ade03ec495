//! Generators for argument values that must survive a `to_args` round trip: no leading `-`,
//! no NaN, and floats with a short decimal form.

use arbitrary::Arbitrary;
use arbitrary::Unstructured;
use std::path::PathBuf;

fn word(u: &mut Unstructured<'_>, prefix: &str) -> arbitrary::Result<String> {
    Ok(format!("{prefix}{}", u.int_in_range(0..=999u16)?))
}

pub fn image_path(u: &mut Unstructured<'_>) -> arbitrary::Result<String> {
    Ok(format!("{}.png", word(u, "img")?))
}

/// One to three image paths
pub fn image_paths(u: &mut Unstructured<'_>) -> arbitrary::Result<Vec<String>> {
    let count = u.int_in_range(1..=3u8)?;
    (0..count).map(|_| image_path(u)).collect()
}

pub fn optional_dir(u: &mut Unstructured<'_>) -> arbitrary::Result<Option<PathBuf>> {
    if bool::arbitrary(u)? {
        Ok(Some(PathBuf::from(word(u, "out")?)))
    } else {
        Ok(None)
    }
}

pub fn optional_name(u: &mut Unstructured<'_>) -> arbitrary::Result<Option<String>> {
    if bool::arbitrary(u)? {
        Ok(Some(word(u, "name")?))
    } else {
        Ok(None)
    }
}

/// Tenths in `[0.1, 0.9]`
pub fn optional_fraction(u: &mut Unstructured<'_>) -> arbitrary::Result<Option<f32>> {
    if bool::arbitrary(u)? {
        Ok(Some(f32::from(u.int_in_range(1..=9u8)?) / 10.0))
    } else {
        Ok(None)
    }
}

/// Whole percentages in `[0, 200]`
pub fn optional_percent(u: &mut Unstructured<'_>) -> arbitrary::Result<Option<f32>> {
    if bool::arbitrary(u)? {
        Ok(Some(f32::from(u.int_in_range(0..=200u8)?)))
    } else {
        Ok(None)
    }
}

pub fn width(u: &mut Unstructured<'_>) -> arbitrary::Result<u32> {
    u.int_in_range(1..=4096)
}

pub fn concurrency(u: &mut Unstructured<'_>) -> arbitrary::Result<u32> {
    u.int_in_range(1..=32)
}

pub fn rotations(u: &mut Unstructured<'_>) -> arbitrary::Result<Vec<i32>> {
    const CHOICES: [i32; 6] = [-90, 45, 90, 180, 270, -180];
    let count = u.int_in_range(0..=3u8)?;
    (0..count).map(|_| u.choose(&CHOICES).copied()).collect()
}
