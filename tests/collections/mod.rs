mod records_case;
