//! Locally produced artifacts: fixed package files, scripts and the test suite

use crate::pipeline::planner::{ArtifactRole, ArtifactStrategy};
use crate::request::Request;

const PACKAGE_INIT: &str = "from . import agent\n";

const CONFIG_INIT: &str =
    "from .agent_config import get_agent_config\n\n__all__ = ['get_agent_config']\n";

const SETUP_SCRIPT: &str = r#"#!/bin/bash
# Setup script for the __AGENT_NAME__ agent
# Creates a virtual environment and installs dependencies

set -e

AGENT_DIR="$(cd "$(dirname "${BASH_SOURCE[0]}")" && pwd)"
VENV_DIR="$AGENT_DIR/.venv"

echo "Setting up agent: __AGENT_NAME__"

if [ ! -d "$VENV_DIR" ]; then
    echo "Creating virtual environment at $VENV_DIR..."
    python3 -m venv "$VENV_DIR"
fi

source "$VENV_DIR/bin/activate"
pip install --upgrade pip setuptools wheel

if [ -f "$AGENT_DIR/requirements.txt" ]; then
    pip install -r "$AGENT_DIR/requirements.txt"
else
    echo "requirements.txt not found, skipping dependency install"
fi

if [ ! -f "$AGENT_DIR/.env" ] && [ -f "$AGENT_DIR/.env.example" ]; then
    echo "Copy .env.example to .env and fill in your credentials:"
    echo "  cp $AGENT_DIR/.env.example $AGENT_DIR/.env"
fi

echo "Setup complete. Start the agent with ./run.sh"
"#;

const RUN_SCRIPT: &str = r#"#!/bin/bash
# Run the __AGENT_NAME__ agent with the ADK CLI

set -e

AGENT_DIR="$(cd "$(dirname "${BASH_SOURCE[0]}")" && pwd)"
VENV_DIR="$AGENT_DIR/.venv"

if [ ! -d "$VENV_DIR" ]; then
    echo "Virtual environment not found, run ./setup.sh first"
    exit 1
fi

source "$VENV_DIR/bin/activate"

if [ -f "$AGENT_DIR/.env" ]; then
    set -a
    source "$AGENT_DIR/.env"
    set +a
fi

cd "$AGENT_DIR/.."
exec adk run "$(basename "$AGENT_DIR")"
"#;

const TEST_SUITE: &str = r#""""
Pytest tests for the __AGENT_NAME__ agent.
"""

import sys
from pathlib import Path

import pytest

AGENT_DIR = Path(__file__).parent
sys.path.insert(0, str(AGENT_DIR))

REQUIRED_FILES = [
__REQUIRED_FILES__
]


class TestAgentStructure:
    """Agent structure and imports."""

    def test_agent_module_imports(self):
        try:
            import agent
        except ImportError as e:
            pytest.fail(f"Failed to import agent module: {e}")
        assert hasattr(agent, "root_agent"), "root_agent not found in agent module"

    def test_config_module_imports(self):
        from config import get_agent_config

        assert callable(get_agent_config)

    def test_agent_config_structure(self):
        from config import get_agent_config

        config = get_agent_config()
        assert isinstance(config, dict)
        for key in ("name", "model", "instruction", "description"):
            assert key in config, f"Config missing '{key}' key"

    def test_tools_module_imports(self):
        from tools import get_agent_tools

        assert callable(get_agent_tools)


class TestAgentFiles:
    """Generated project layout."""

    def test_required_files_exist(self):
        for file_path in REQUIRED_FILES:
            assert (AGENT_DIR / file_path).exists(), f"Required file not found: {file_path}"

    def test_requirements_file(self):
        content = (AGENT_DIR / "requirements.txt").read_text()
        assert "google-adk" in content or "google.adk" in content
"#;

fn required_files(request: &Request) -> String {
    ArtifactRole::ALL
        .into_iter()
        .filter(|role| role.strategy() == ArtifactStrategy::LlmGenerated)
        .filter(|role| !role.requires_pipedream() || request.uses_pipedream())
        .map(|role| format!("    \"{}\",", role.path()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Content for roles produced without the generation service
///
/// Returns `None` for roles whose content comes from the generation service.
pub fn render(role: ArtifactRole, request: &Request) -> Option<String> {
    let agent_name = request.agent_identifier();
    let content = match role {
        ArtifactRole::PackageInit => PACKAGE_INIT.to_string(),
        ArtifactRole::ConfigInit => CONFIG_INIT.to_string(),
        ArtifactRole::SetupScript => SETUP_SCRIPT.replace("__AGENT_NAME__", &agent_name),
        ArtifactRole::RunScript => RUN_SCRIPT.replace("__AGENT_NAME__", &agent_name),
        ArtifactRole::TestSuite => TEST_SUITE
            .replace("__AGENT_NAME__", &agent_name)
            .replace("__REQUIRED_FILES__", &required_files(request)),
        _ => return None,
    };
    Some(content)
}
