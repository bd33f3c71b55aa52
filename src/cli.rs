//! Command-line interface.

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::scaffold::Kind;

/// Build pipeline for WeChat mini-program projects.
#[derive(Debug, Parser)]
#[command(name = "dandori", version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Remove previous build output, keeping packaged dependencies
    Clean,
    /// Copy sources that no compiler owns into the output tree
    Copy,
    /// Like copy, but skip files whose output is already current
    #[command(name = "copyChange")]
    CopyChange,
    /// Compile TypeScript sources
    #[command(name = "compile-ts")]
    CompileTs,
    /// Compile stylesheets to WXSS
    #[command(name = "compile-less")]
    CompileLess,
    /// Minify WXML markup into the output tree
    #[command(name = "minify-wxml")]
    MinifyWxml,
    /// Minify JSON data into the output tree
    #[command(name = "minify-json")]
    MinifyJson,
    /// Recompress source images in place
    #[command(name = "minify-image")]
    MinifyImage,
    /// Clean, then compile and package everything
    Compile,
    /// Compile, then minify markup, data and images
    Build,
    /// Compile, then rebuild whenever sources change
    Watch,
    /// Scaffold a new page or component from the templates
    Create(CreateArgs),
}

#[derive(Debug, ClapArgs)]
pub struct CreateArgs {
    /// Template variant subdirectory to scaffold from
    #[arg(short = 's', long = "src", value_name = "DIR", default_value = "")]
    pub src: String,

    /// Name of the page to create
    #[arg(short = 'p', long = "page", value_name = "NAME", conflicts_with = "component")]
    pub page: Option<String>,

    /// Name of the component to create
    #[arg(short = 'c', long = "component", value_name = "NAME")]
    pub component: Option<String>,
}

impl CreateArgs {
    /// The requested target, or `None` when neither flag was given.
    pub fn target(&self) -> Option<(Kind, &str)> {
        if let Some(name) = &self.page {
            return Some((Kind::Page, name));
        }
        if let Some(name) = &self.component {
            return Some((Kind::Component, name));
        }
        None
    }
}
