use may_minihttp::Response;

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "OK",
    }
}

/// Write a shaped wire response back to the transport. A `None` body
/// (HEAD, 204) writes status and headers only.
pub fn write_response(
    res: &mut Response,
    status: u16,
    headers: &[(String, String)],
    body: Option<Vec<u8>>,
) {
    res.status_code(status as usize, status_reason(status));
    for (name, value) in headers {
        // may_minihttp wants 'static header lines
        let line = format!("{name}: {value}").into_boxed_str();
        res.header(&*Box::leak(line));
    }
    if let Some(bytes) = body {
        res.body_vec(bytes);
    }
}
