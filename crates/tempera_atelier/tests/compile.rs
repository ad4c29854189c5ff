//! End-to-end template compilation.

use insta::assert_snapshot;
use proptest::prelude::*;
use tempera_atelier::{
    compile_template, markup, template, CompileContext, CompileError, CompileOptions, LoadError, MemoryLoader,
};
use tempera_relief::ParseTree;

fn compile_with(source: &str, loader: MemoryLoader, options: CompileOptions) -> Result<String, CompileError> {
    let mut ctx = CompileContext::new(options).with_loader(loader);
    compile_template(source, "page.html", &mut ctx)
}

fn compile(source: &str, loader: MemoryLoader) -> String {
    compile_with(source, loader, CompileOptions::default()).unwrap()
}

fn base() -> MemoryLoader {
    MemoryLoader::new().with(
        "base.html",
        "{% load i18n %}<div>{% block a %}A{% endblock %}{% block b %}B{% endblock %}</div>",
    )
}

mod inheritance {
    use super::*;

    #[test]
    fn child_blocks_replace_parent_blocks() {
        assert_snapshot!(
            compile("{% extends \"base.html\" %}ignored{% block b %}C{% endblock %}", base()),
            @"{%load i18n%}<div>AC</div>"
        );
    }

    #[test]
    fn block_super() {
        assert_snapshot!(
            compile("{% extends \"base.html\" %}{% block b %}{{ block.super }}C{% endblock %}", base()),
            @"{%load i18n%}<div>ABC</div>"
        );
    }

    #[test]
    fn last_child_block_wins() {
        assert_snapshot!(
            compile(
                "{% extends \"base.html\" %}{% block a %}1{% endblock %}{% block a %}2{% endblock %}",
                base()
            ),
            @"{%load i18n%}<div>2B</div>"
        );
    }

    #[test]
    fn block_tags_kept_on_request() {
        let options = CompileOptions {
            remove_block_tags: false,
            ..CompileOptions::default()
        };
        let out = compile_with("{% extends \"base.html\" %}{% block a %}X{% endblock %}", base(), options).unwrap();
        assert_snapshot!(out, @"{%load i18n%}<div>{%block a%}X{%endblock%}{%block b%}B{%endblock%}</div>");
    }

    #[test]
    fn child_loads_are_merged() {
        assert_snapshot!(
            compile("{% extends \"base.html\" %}{% load humanize %}{% block a %}{% endblock %}", base()),
            @"{%load humanize i18n%}<div>B</div>"
        );
    }

    #[test]
    fn orphan_block_warns() {
        let mut ctx = CompileContext::default().with_loader(base());
        let out = compile_template(
            "{% extends \"base.html\" %}{% block zzz %}Z{% endblock %}",
            "page.html",
            &mut ctx,
        )
        .unwrap();
        assert_eq!(out, "{%load i18n%}<div>AB</div>");
        let warnings = ctx.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].message,
            "Found {% block zzz %} which has not been found in the parent"
        );
    }

    #[test]
    fn orphan_block_error() {
        let options = CompileOptions {
            disallow_orphan_blocks: true,
            ..CompileOptions::default()
        };
        let err = compile_with("{% extends \"base.html\" %}{% block zzz %}{% endblock %}", base(), options)
            .unwrap_err();
        assert!(matches!(err, CompileError::Template { .. }), "{err}");
    }

    #[test]
    fn variable_parent_is_rejected() {
        let err = compile_with("{% extends parent %}", base(), CompileOptions::default()).unwrap_err();
        assert_snapshot!(
            err.to_string(),
            @"In: page.html
Line 1, column 1: Preprocessor does not support variable {% extends %} nodes"
        );
    }

    #[test]
    fn missing_parent() {
        let err = compile_with("{% extends \"nope.html\" %}", base(), CompileOptions::default()).unwrap_err();
        assert!(
            matches!(
                err,
                CompileError::Load {
                    source: LoadError::NotFound,
                    ..
                }
            ),
            "{err}"
        );
    }

    #[test]
    fn multi_level() {
        let loader = base().with("middle.html", "{% extends \"base.html\" %}{% block a %}M{% endblock %}");
        assert_snapshot!(
            compile("{% extends \"middle.html\" %}{% block b %}{{ block.super }}!{% endblock %}", loader),
            @"{%load i18n%}<div>MB!</div>"
        );
    }
}

mod includes {
    use super::*;

    fn loader() -> MemoryLoader {
        MemoryLoader::new()
            .with("nav.html", "<nav>{% include \"link.html\" %}</nav>")
            .with("link.html", "<a>x</a>")
            .with("frame.html", "<section>{{ decorater.content }}</section>")
            .with("self.html", "{% include \"self.html\" %}")
    }

    #[test]
    fn include_is_expanded() {
        let mut ctx = CompileContext::default().with_loader(loader());
        let out = compile_template("<p>{% include \"nav.html\" %}</p>", "page.html", &mut ctx).unwrap();
        assert_snapshot!(out, @"<p><nav><a>x</a></nav></p>");
        assert_eq!(ctx.dependencies(), &["nav.html", "link.html"]);
    }

    #[test]
    fn dynamic_include_is_kept() {
        assert_snapshot!(
            compile("{% include name %}{% include \"nav.html\" with a=b %}", loader()),
            @r#"{%include name%}{%include "nav.html" with a=b%}"#
        );
    }

    #[test]
    fn self_include_is_an_error() {
        let err = compile_with("{% include \"self.html\" %}", loader(), CompileOptions::default()).unwrap_err();
        assert!(
            matches!(&err, CompileError::Template { message, .. } if message == "Template 'self.html' includes itself"),
            "{err}"
        );
    }

    #[test]
    fn decorate() {
        assert_snapshot!(
            compile("{% decorate \"frame.html\" %}<b>hi</b>{% enddecorate %}", loader()),
            @"<section><b>hi</b></section>"
        );
    }

    #[test]
    fn variable_decorate_is_rejected() {
        let err = compile_with("{% decorate frame %}x{% enddecorate %}", loader(), CompileOptions::default())
            .unwrap_err();
        assert!(
            matches!(
                &err,
                CompileError::Template { message, .. }
                    if message == "Do not use variable template names in {% decorate %}"
            ),
            "{err}"
        );
    }
}

mod preprocessing {
    use super::*;

    #[test]
    fn macros() {
        assert_snapshot!(
            compile(
                "{% macro greet %}<b>Hi</b>{% endmacro %}{% callmacro greet %}{% callmacro greet %}",
                MemoryLoader::new()
            ),
            @"<b>Hi</b><b>Hi</b>"
        );
    }

    #[test]
    fn ifdebug() {
        let source = "a{% ifdebug %}<i>debug</i>{% endifdebug %}";
        assert_snapshot!(compile(source, MemoryLoader::new()), @"a");

        let options = CompileOptions {
            debug: true,
            ..CompileOptions::default()
        };
        assert_snapshot!(compile_with(source, MemoryLoader::new(), options).unwrap(), @"a<i>debug</i>");
    }

    #[test]
    fn variables() {
        let mut options = CompileOptions::default();
        options.variables.insert("STATIC_URL".into(), "/static/".into());
        assert_snapshot!(
            compile_with("<img src=\"{{ STATIC_URL }}a.png\">{{ user }}", MemoryLoader::new(), options).unwrap(),
            @r#"<img src="/static/a.png">{{user}}"#
        );
    }

    #[test]
    fn load_tags_are_grouped() {
        assert_snapshot!(
            compile(
                "{% load a %}<p>{% load b a %}</p>{% load url from future %}",
                MemoryLoader::new()
            ),
            @"{%load a b%}<p></p>{%load url from future%}"
        );
    }

    #[test]
    fn no_html_option() {
        assert_snapshot!(
            compile("{% ! no-html %}<p>  a  </p>", MemoryLoader::new()),
            @"<p>  a  </p>"
        );
    }

    #[test]
    fn unknown_option() {
        let err = compile_with("{% ! bogus %}", MemoryLoader::new(), CompileOptions::default()).unwrap_err();
        assert!(
            matches!(&err, CompileError::UnknownOption { option, .. } if option == "bogus"),
            "{err}"
        );
    }

    #[test]
    fn raw_output() {
        assert_snapshot!(
            compile("{% !raw %}{%  x %}  <p>{# c #}{% !endraw %}", MemoryLoader::new()),
            @"{%  x %}  <p>{# c #}"
        );
    }
}

mod html {
    use super::*;

    #[test]
    fn whitespace_is_compressed() {
        assert_snapshot!(
            compile("<p>a   b\n\n</p>  <pre>  x  </pre>", MemoryLoader::new()),
            @"<p>a b </p> <pre>  x  </pre>"
        );
    }

    #[test]
    fn comments_are_removed() {
        assert_snapshot!(compile("<p><!-- note --></p>", MemoryLoader::new()), @"<p></p>");
    }

    #[test]
    fn inline_script() {
        assert_snapshot!(
            compile("<script>\n  a = 1; /* c */ b = 2;\n</script>", MemoryLoader::new()),
            @"<script>a=1;b=2;</script>"
        );
    }

    #[test]
    fn declarations_in_both_branches_share_a_name() {
        let out = compile(
            "<script>function f(x){ {% if a %}var y = x;{% else %}var y = 2;{% endif %} return y; }</script>",
            MemoryLoader::new(),
        );
        assert!(out.starts_with("<script>function f(a){"), "{out}");
        assert!(out.contains("var b=a;{%else%}var b=2;{%endif%}"), "{out}");
        assert!(out.contains("return b;"), "{out}");
    }

    #[test]
    fn object_key_after_template_tag_is_kept() {
        let out = compile(
            "<script>function f(b){ return { {% if q %}a: 1,{% endif %} b: 2 }; }</script>",
            MemoryLoader::new(),
        );
        assert!(out.starts_with("<script>function f(a){"), "{out}");
        assert!(out.contains("{%if q%}a:1,{%endif%} b:2}"), "{out}");
    }

    #[test]
    fn non_javascript_script_is_kept() {
        assert_snapshot!(
            compile("<script type=\"text/template\">  a  =  1  </script>", MemoryLoader::new()),
            @r#"<script type="text/template">  a  =  1  </script>"#
        );
    }

    #[test]
    fn inline_style() {
        assert_snapshot!(
            compile("<style>\n  a { color : red }\n</style>", MemoryLoader::new()),
            @"<style>a{color:red}</style>"
        );
    }

    #[test]
    fn script_error_points_into_template() {
        let err = compile_with("<p>\n<script>s = 'abc</script>", MemoryLoader::new(), CompileOptions::default())
            .unwrap_err();
        assert_eq!(err.location().map(|loc| loc.line), Some(2), "{err}");
    }
}

mod compress {
    use super::*;
    use tempera_atelier::{compile_script_source, compile_stylesheet_source};
    use tempera_carton::MediaCache;

    const A_JS: &str = "function a(x){ return x; }";
    const B_JS: &str = "b( 1 );";
    const SITE_CSS: &str = "a { background : url(../img/x.png) }";
    const PRINT_CSS: &str = "p { color : red }";

    fn media() -> MemoryLoader {
        MemoryLoader::new()
            .with("/static/a.js", A_JS)
            .with("https://cdn.example.com/b.js", B_JS)
            .with("/static/css/site.css", SITE_CSS)
            .with("/static/print.css", PRINT_CSS)
    }

    fn packing() -> CompileContext {
        let options = CompileOptions {
            pack_external_javascript: true,
            pack_external_css: true,
            ..CompileOptions::default()
        };
        CompileContext::new(options).with_media_loader(media())
    }

    #[test]
    fn external_scripts_become_one_bundle() {
        let mut ctx = packing();
        let out = compile_template(
            "{% compress %}<script src=\"/static/a.js\"></script>\n<script src=\"https://cdn.example.com/b.js\"></script><script src=\"/local.js\"></script>{% endcompress %}",
            "page.html",
            &mut ctx,
        )
        .unwrap();

        let bundles = ctx.bundles();
        assert_eq!(bundles.len(), 1);
        let bundle = &bundles[0];
        assert_eq!(bundle.files, ["/static/a.js", "https://cdn.example.com/b.js"]);
        assert!(bundle.url.starts_with("/media/cache/") && bundle.url.ends_with(".js"), "{}", bundle.url);

        let cache = MediaCache::new();
        let expected = format!(
            "{}\n{}",
            compile_script_source(A_JS, "a.js", &cache).unwrap(),
            compile_script_source(B_JS, "b.js", &cache).unwrap()
        );
        assert_eq!(&*bundle.content, expected);
        assert_eq!(
            out,
            format!("<script src=\"{}\"></script> <script src=\"/local.js\"></script>", bundle.url)
        );
    }

    #[test]
    fn stylesheets_are_grouped_by_media() {
        let mut ctx = packing();
        let out = compile_template(
            "{% compress %}<link rel=\"stylesheet\" type=\"text/css\" href=\"/static/css/site.css\">\
             <link rel=\"stylesheet\" href=\"/static/print.css\" media=\"print\">\
             <link rel=\"stylesheet\" href=\"/static/css/site.css\" media=\"print\">{% endcompress %}",
            "page.html",
            &mut ctx,
        )
        .unwrap();

        let bundles = ctx.bundles();
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].files, ["/static/css/site.css"]);
        assert_eq!(bundles[1].files, ["/static/print.css", "/static/css/site.css"]);
        assert!(bundles[0].content.contains("url('/static/img/x.png')"), "{}", bundles[0].content);

        let cache = MediaCache::new();
        let site = compile_stylesheet_source(SITE_CSS, "site.css", Some("/static/css/site.css"), &cache).unwrap();
        let print = compile_stylesheet_source(PRINT_CSS, "print.css", Some("/static/print.css"), &cache).unwrap();
        assert_eq!(&*bundles[0].content, site);
        assert_eq!(&*bundles[1].content, format!("{print}\n{site}"));
        assert_eq!(
            out,
            format!(
                "<link rel=\"stylesheet\" type=\"text/css\" href=\"{}\"><link rel=\"stylesheet\" href=\"{}\" media=\"print\">",
                bundles[0].url, bundles[1].url
            )
        );
    }

    #[test]
    fn same_files_share_a_bundle_url() {
        let source = "{% compress %}<script src=\"/static/a.js\"></script>{% endcompress %}";
        let mut first = packing();
        compile_template(source, "one.html", &mut first).unwrap();
        let mut second = packing();
        compile_template(source, "two.html", &mut second).unwrap();
        assert_eq!(first.bundles()[0].url, second.bundles()[0].url);
    }

    #[test]
    fn packing_is_off_by_default() {
        let source = "{% compress %}<script src=\"/static/a.js\"></script>{% endcompress %}";
        let mut ctx = CompileContext::default().with_media_loader(media());
        let out = compile_template(source, "page.html", &mut ctx).unwrap();
        assert_snapshot!(out, @r#"<script src="/static/a.js"></script>"#);
        assert!(ctx.bundles().is_empty());
    }

    #[test]
    fn missing_media_file() {
        let mut ctx = packing();
        let err = compile_template(
            "<p>\n{% compress %}<script src=\"/static/missing.js\"></script>{% endcompress %}",
            "page.html",
            &mut ctx,
        )
        .unwrap_err();
        assert!(
            matches!(
                &err,
                CompileError::Load { name, loc, source: LoadError::NotFound } if name == "/static/missing.js" && loc.line == 2
            ),
            "{err}"
        );
    }
}

proptest! {
    #[test]
    fn template_round_trip(source in "[a-z {}%#]{0,40}") {
        let mut tree = ParseTree::new("t.html", &source);
        if template::parse(&mut tree).is_ok() {
            prop_assert_eq!(tree.serialize(), source);
        }
    }

    #[test]
    fn template_and_markup_round_trip(source in "[a-z <>/=\"{}%]{0,40}") {
        let mut tree = ParseTree::new("t.html", &source);
        let parsed = template::parse(&mut tree)
            .and_then(|()| markup::lex(&mut tree))
            .and_then(|()| markup::nest_elements(&mut tree));
        if parsed.is_ok() {
            prop_assert_eq!(tree.serialize(), source);
        }
    }
}
