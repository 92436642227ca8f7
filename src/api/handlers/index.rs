use axum::response::Html;

const UPLOAD_FORM: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>File Upload</title>
  </head>
  <body>
    <h1>Upload Your File</h1>
    <form action="/upload" method="post" enctype="multipart/form-data">
      <label for="fileInput">Choose file:</label>
      <input type="file" id="fileInput" name="file" required>
      <button type="submit">Upload</button>
    </form>
  </body>
</html>
"#;

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Upload form", body = String, content_type = "text/html")
    ),
    tag = "upload"
)]
pub async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}
