/// Renders an opaque external id for logs and error messages.
///
/// Ids are arbitrary bytes; anything that is not valid UTF-8 is shown lossily.
pub fn display_id(id: &[u8]) -> String {
    String::from_utf8_lossy(id).into_owned()
}
