// Template renderer contract
//
// No engine ships with the framework. Domain controllers consume this trait
// and the hosting application binds a concrete renderer into the container.

use crate::Error;
use std::collections::HashMap;

/// Parameters handed to a template.
pub type RenderParams = HashMap<String, serde_json::Value>;

/// Renders a template identifier plus parameters into a string.
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, params: &RenderParams) -> Result<String, Error>;
}

/// A renderer backed by a closure. Handy in tests and for applications whose
/// "templates" are plain functions.
pub struct FnRenderer<F>
where
    F: Fn(&str, &RenderParams) -> Result<String, Error> + Send + Sync,
{
    render_fn: F,
}

impl<F> FnRenderer<F>
where
    F: Fn(&str, &RenderParams) -> Result<String, Error> + Send + Sync,
{
    pub fn new(render_fn: F) -> Self {
        Self { render_fn }
    }
}

impl<F> Renderer for FnRenderer<F>
where
    F: Fn(&str, &RenderParams) -> Result<String, Error> + Send + Sync,
{
    fn render(&self, template: &str, params: &RenderParams) -> Result<String, Error> {
        (self.render_fn)(template, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Container;
    use std::sync::Arc;

    #[test]
    fn test_renderer_bound_into_container() {
        let container = Container::new();
        let renderer: Arc<dyn Renderer> = Arc::new(FnRenderer::new(|template, params| {
            let name = params
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("world");
            Ok(format!("[{}] hello {}", template, name))
        }));
        container
            .register_instance::<Arc<dyn Renderer>>(renderer)
            .unwrap();

        let renderer = container.value::<Arc<dyn Renderer>>().unwrap();
        let mut params = RenderParams::new();
        params.insert("name".to_string(), serde_json::json!("gantry"));

        let output = renderer.render("greeting", &params).unwrap();
        assert_eq!(output, "[greeting] hello gantry");
    }

    #[test]
    fn test_render_glue_sets_response_content() {
        use crate::HttpResponse;

        let renderer = FnRenderer::new(|template, _| Ok(format!("<html>{}</html>", template)));
        let mut response = HttpResponse::html("");
        let rendered = renderer.render("post/show", &RenderParams::new()).unwrap();
        response.set_content(rendered);

        assert_eq!(response.body_string(), "<html>post/show</html>");
    }
}
