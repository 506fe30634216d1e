/// Suggest a fresh object name for an instance of `class_name`.
///
/// `com.example.Widget<T>` becomes `widget1`, `int[]` becomes `intArray1`;
/// the numeric suffix is the smallest positive one `is_taken` rejects.
pub fn guess_new_name(class_name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let stem = name_stem(class_name);
    (1u32..)
        .map(|n| format!("{stem}{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or(stem)
}

fn name_stem(class_name: &str) -> String {
    let mut base = class_name.trim();
    let mut dimensions = 0;
    while let Some(element) = base.strip_suffix("[]") {
        base = element.trim_end();
        dimensions += 1;
    }
    let base = match base.find('<') {
        Some(generics) => &base[..generics],
        None => base,
    };
    let simple = base.rsplit(['.', '$']).next().unwrap_or(base).trim();

    let mut stem = String::with_capacity(simple.len() + dimensions * 5);
    let mut chars = simple.chars();
    match chars.next() {
        Some(first) => {
            stem.extend(first.to_lowercase());
            stem.extend(chars);
        }
        None => stem.push_str("object"),
    }
    for _ in 0..dimensions {
        stem.push_str("Array");
    }
    stem
}
